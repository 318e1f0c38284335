//! Errors raised while loading settings and resolving client URLs.

use thiserror::Error;

/// Failure to produce a usable client configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting is out of range, or a base URL has no host or cannot carry
    /// path segments
    #[error("Invalid client setting: {0}")]
    Config(String),

    /// `config.json` or the base directory could not be read or created
    #[error("Cannot access client files: {0}")]
    Io(#[from] std::io::Error),

    /// A backend or frontend URL does not parse
    #[error("Malformed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// `config.json` is not valid JSON for [`crate::Config`]
    #[error("Malformed config.json: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to put `~/.pacedream` under
    #[error("Cannot locate the PaceDream directory: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
