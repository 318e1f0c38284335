//! Configuration, paths, and logging for the PaceDream API client.

mod config;
mod error;
mod logging;
mod paths;
mod urls;

pub use config::{
    Config, DEFAULT_BACKEND_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FRONTEND_URL,
    DEFAULT_LOG_LEVEL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_BACKOFF_MS,
    DEFAULT_RETRY_MAX_ATTEMPTS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
pub use urls::{append_segments, normalize_api_url, normalize_frontend_url, redact_url};
