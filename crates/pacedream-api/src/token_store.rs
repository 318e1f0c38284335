//! Durable session holder that drives the auth state machine.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState, AuthStateChangedPayload};
use crate::session::Session;
use crate::ApiResult;
use pacedream_storage::SecretsManager;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

enum Cached {
    Unloaded,
    Loaded(Option<Session>),
}

/// Owns the current session.
///
/// Durable storage is written first and the in-memory copy replaced after,
/// all under one write lock, so readers observe either the previous session
/// or the new one.
pub struct TokenStore {
    secrets: SecretsManager,
    cache: RwLock<Cached>,
    fsm: Mutex<AuthMachine>,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

impl TokenStore {
    pub fn new(secrets: SecretsManager) -> Self {
        Self {
            secrets,
            cache: RwLock::new(Cached::Unloaded),
            fsm: Mutex::new(AuthMachine::new()),
            state_callback: Mutex::new(None),
        }
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState::from(self.fsm.lock().state())
    }

    /// Auxiliary stored values (user id, cached profile, checkout).
    pub fn secrets(&self) -> &SecretsManager {
        &self.secrets
    }

    /// Current session, reading durable storage on first use.
    pub fn load(&self) -> ApiResult<Option<Session>> {
        if let Cached::Loaded(session) = &*self.cache.read() {
            return Ok(session.clone());
        }

        let mut cache = self.cache.write();
        if let Cached::Loaded(session) = &*cache {
            return Ok(session.clone());
        }

        let session = self
            .secrets
            .get_session_record()?
            .and_then(Session::from_record);
        *cache = Cached::Loaded(session.clone());
        drop(cache);

        debug!(present = session.is_some(), "Loaded session from storage");
        self.transition(if session.is_some() {
            AuthMachineInput::SessionLoaded
        } else {
            AuthMachineInput::NoSession
        });
        Ok(session)
    }

    /// Replace the session (login or manual seeding).
    pub fn save(&self, session: Session) -> ApiResult<()> {
        self.replace(Some(session))?;
        self.transition(AuthMachineInput::SessionSaved);
        Ok(())
    }

    /// Remove the tokens. Cached profile data is kept.
    pub fn clear(&self) -> ApiResult<()> {
        {
            let mut cache = self.cache.write();
            self.secrets.clear_session_record()?;
            *cache = Cached::Loaded(None);
        }
        self.transition(AuthMachineInput::Cleared);
        Ok(())
    }

    /// Remove every stored value (sign out).
    pub fn clear_all(&self) -> ApiResult<()> {
        {
            let mut cache = self.cache.write();
            let result = self.secrets.clear_all();
            // Tokens are gone from memory even if another key failed to delete
            *cache = Cached::Loaded(None);
            result?;
        }
        self.transition(AuthMachineInput::Cleared);
        info!("Cleared all stored credentials");
        Ok(())
    }

    /// The server answered 401 to the current access token.
    pub fn mark_token_rejected(&self) {
        self.transition(AuthMachineInput::TokenRejected);
    }

    pub fn refresh_succeeded(&self, session: Session) -> ApiResult<()> {
        self.replace(Some(session))?;
        self.transition(AuthMachineInput::RefreshSucceeded);
        Ok(())
    }

    /// The refresh token was rejected: drop the tokens.
    ///
    /// The cached session is dropped even when the durable delete fails.
    pub fn refresh_failed(&self) -> ApiResult<()> {
        let result = {
            let mut cache = self.cache.write();
            let result = self.secrets.clear_session_record();
            *cache = Cached::Loaded(None);
            result
        };
        self.transition(AuthMachineInput::RefreshFailed);
        Ok(result?)
    }

    fn replace(&self, session: Option<Session>) -> ApiResult<()> {
        let mut cache = self.cache.write();
        match &session {
            Some(session) => self.secrets.set_session_record(&session.to_record())?,
            None => self.secrets.clear_session_record()?,
        }
        *cache = Cached::Loaded(session);
        Ok(())
    }

    fn transition(&self, input: AuthMachineInput) {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        if fsm.consume(&input).is_err() {
            debug!(input = ?input, state = %old_state, "Ignoring auth input in this state");
            return;
        }

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(old_state = %old_state, new_state = %new_state, "Auth state transition");
            self.notify_state_change(new_state);
        }
    }

    fn notify_state_change(&self, state: AuthState) {
        let callback = self.state_callback.lock();
        if let Some(callback) = callback.as_ref() {
            let user_id = self.secrets.get_user_id().ok().flatten();
            callback(AuthStateChangedPayload { state, user_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApiError;
    use pacedream_storage::{create_memory_secrets_manager, create_secrets_manager};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store() -> TokenStore {
        TokenStore::new(create_memory_secrets_manager())
    }

    fn session(access: &str, refresh: &str) -> Session {
        Session::new(access, refresh).unwrap()
    }

    #[test]
    fn test_empty_store_loads_unauthenticated() {
        let store = store();
        assert_eq!(store.auth_state(), AuthState::Unknown);
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.auth_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_save_then_load() {
        let store = store();
        store.save(session("a1", "r1")).unwrap();
        assert_eq!(store.auth_state(), AuthState::Authenticated);
        assert_eq!(store.load().unwrap(), Some(session("a1", "r1")));
    }

    #[test]
    fn test_clear_then_load_is_absent() {
        let store = store();
        store.save(session("a1", "r1")).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.auth_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_clear_keeps_cached_user_but_clear_all_does_not() {
        let store = store();
        store.save(session("a1", "r1")).unwrap();
        store.secrets().set_cached_user("{}").unwrap();

        store.clear().unwrap();
        assert!(store.secrets().get_cached_user().unwrap().is_some());

        store.clear_all().unwrap();
        assert!(store.secrets().get_cached_user().unwrap().is_none());
    }

    #[test]
    fn test_refresh_lifecycle() {
        let store = store();
        store.save(session("a1", "r1")).unwrap();

        store.mark_token_rejected();
        assert_eq!(store.auth_state(), AuthState::AuthenticatedWithRefreshNeeded);

        store.refresh_succeeded(session("a2", "r2")).unwrap();
        assert_eq!(store.auth_state(), AuthState::Authenticated);
        assert_eq!(store.load().unwrap().unwrap().access_token(), "a2");

        store.mark_token_rejected();
        store.refresh_failed().unwrap();
        assert_eq!(store.auth_state(), AuthState::Unauthenticated);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_refresh_failed_drops_cached_tokens_when_delete_fails() {
        let store = crate::testing::undeletable_store(session("a1", "r1"));
        store.mark_token_rejected();

        assert!(matches!(store.refresh_failed(), Err(ApiError::Storage(_))));
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.auth_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_session_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = TokenStore::new(create_secrets_manager(&path).unwrap());
        store.save(session("a1", "r1")).unwrap();
        store.refresh_succeeded(session("a2", "r2")).unwrap();
        drop(store);

        let reopened = TokenStore::new(create_secrets_manager(&path).unwrap());
        let loaded = reopened.load().unwrap().unwrap();
        assert_eq!(loaded.access_token(), "a2");
        assert_eq!(loaded.refresh_token(), "r2");
        assert_eq!(reopened.auth_state(), AuthState::Authenticated);
    }

    #[test]
    fn test_state_callback_fires_on_change_only() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.set_state_callback(Box::new(move |payload| sink.lock().push(payload.state)));

        store.save(session("a1", "r1")).unwrap();
        store.save(session("a1", "r1")).unwrap();
        store.mark_token_rejected();
        store.mark_token_rejected();
        store.refresh_failed().unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                AuthState::Authenticated,
                AuthState::AuthenticatedWithRefreshNeeded,
                AuthState::Unauthenticated,
            ]
        );
    }

    #[test]
    fn test_concurrent_readers_see_whole_sessions() {
        let store = Arc::new(store());
        store.save(session("a0", "r0")).unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 1..200 {
                    store
                        .save(session(&format!("a{}", i), &format!("r{}", i)))
                        .unwrap();
                }
            })
        };

        for _ in 0..200 {
            let loaded = store.load().unwrap().unwrap();
            assert_eq!(
                loaded.access_token().trim_start_matches('a'),
                loaded.refresh_token().trim_start_matches('r')
            );
        }
        writer.join().unwrap();
    }
}
