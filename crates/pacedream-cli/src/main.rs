//! PaceDream command-line client.

mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pacedream_config::init_logging;

use crate::app::AppContext;

/// PaceDream command-line interface.
#[derive(Parser)]
#[command(name = "pacedream")]
#[command(about = "Talk to the PaceDream API with automatic token refresh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and session files. Defaults to ~/.pacedream
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the authentication state
    Status {
        /// Validate the stored session by fetching the profile
        #[arg(long)]
        verify: bool,
    },
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PACEDREAM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Send a request through the authenticated client
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,
        /// Path under the API base, e.g. `account/me` or `search?q=loft`
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Send without the bearer token
        #[arg(long)]
        public: bool,
    },
    /// Store a token pair directly
    SetSession {
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: String,
        /// Access token lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
    },
    /// Sign out and clear every stored value
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let ctx = AppContext::open(cli.base_dir)?;

    init_logging(cli.log_level.as_deref().unwrap_or(&ctx.config.log_level));
    tracing::debug!(
        base_dir = %ctx.paths.base_dir().display(),
        backend = %ctx.config.backend_base_url,
        "Loaded configuration"
    );

    match cli.command {
        Commands::Status { verify } => commands::status(&ctx, verify).await?,
        Commands::Login { email, password } => commands::login(&ctx, &email, &password).await?,
        Commands::Request {
            method,
            path,
            body,
            public,
        } => commands::request(&ctx, &method, &path, body.as_deref(), public).await?,
        Commands::SetSession {
            access,
            refresh,
            expires_in,
        } => commands::set_session(&ctx, access, refresh, expires_in)?,
        Commands::Logout => commands::logout(&ctx)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_request_with_globals() {
        let cli = Cli::try_parse_from([
            "pacedream",
            "request",
            "post",
            "bookings",
            "--body",
            r#"{"listing":"l1"}"#,
            "--log-level",
            "debug",
            "--base-dir",
            "/tmp/pd",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/pd")));
        match cli.command {
            Commands::Request {
                method,
                path,
                body,
                public,
            } => {
                assert_eq!(method, "post");
                assert_eq!(path, "bookings");
                assert_eq!(body.as_deref(), Some(r#"{"listing":"l1"}"#));
                assert!(!public);
            }
            _ => panic!("expected request command"),
        }
    }

    #[test]
    fn test_parse_set_session() {
        let cli = Cli::try_parse_from([
            "pacedream",
            "set-session",
            "--access",
            "a.b.c",
            "--refresh",
            "r1",
            "--expires-in",
            "3600",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::SetSession {
                expires_in: Some(3600),
                ..
            }
        ));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["pacedream"]).is_err());
    }
}
