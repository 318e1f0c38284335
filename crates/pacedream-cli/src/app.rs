//! Wiring from base directory to a ready [`AuthSession`].

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use pacedream_api::{ApiClient, AuthSession, TokenStore};
use pacedream_config::{Config, Paths};
use pacedream_storage::create_secrets_manager;
use tracing::debug;

pub struct AppContext {
    pub paths: Paths,
    pub config: Config,
    pub auth: AuthSession,
}

impl AppContext {
    pub fn open(base_dir: Option<PathBuf>) -> Result<Self, Box<dyn Error>> {
        let paths = match base_dir {
            Some(base) => Paths::with_base_dir(base),
            None => Paths::new()?,
        };
        paths.ensure_dirs()?;

        let config = Config::load(&paths)?;

        let secrets = create_secrets_manager(&paths.session_file())?;
        let store = Arc::new(TokenStore::new(secrets));
        store.set_state_callback(Box::new(|payload| {
            debug!(state = %payload.state, "Auth state changed");
        }));

        let client = ApiClient::from_config(&config, store)?;
        Ok(Self {
            paths,
            config,
            auth: AuthSession::new(client),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacedream_api::AuthState;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_layout() {
        let dir = tempdir().unwrap();
        let ctx = AppContext::open(Some(dir.path().to_path_buf())).unwrap();

        assert!(ctx.paths.base_dir().exists());
        assert_eq!(ctx.config.retry_max_attempts, 2);
        assert!(ctx.auth.client().token_store().load().unwrap().is_none());
        assert_eq!(ctx.auth.auth_state(), AuthState::Unauthenticated);
    }
}
