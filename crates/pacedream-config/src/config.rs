//! Configuration management for the API client.

use crate::urls::{append_segments, normalize_api_url, normalize_frontend_url};
use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default backend URL (can be overridden at compile time via PACEDREAM_BACKEND_URL env var).
pub const DEFAULT_BACKEND_URL: &str = match option_env!("PACEDREAM_BACKEND_URL") {
    Some(url) => url,
    None => "https://pacedream-backend.onrender.com",
};

/// Default frontend URL. Refresh fallback requests are proxied through it.
pub const DEFAULT_FRONTEND_URL: &str = "https://www.pacedream.com";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Whole-request (read) timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Total attempts for a request that fails at the transport level.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 2;

/// Delays between transport retries; the last entry repeats.
pub const DEFAULT_RETRY_BACKOFF_MS: [u64; 2] = [500, 1000];

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend base URL, before `/v1` normalization.
    #[serde(default = "default_backend_base_url")]
    pub backend_base_url: String,
    /// Frontend base URL (no `/v1`).
    #[serde(default = "default_frontend_base_url")]
    pub frontend_base_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Total attempts per request on transport failure (1 disables retry).
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Backoff schedule between attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_backend_base_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_frontend_base_url() -> String {
    DEFAULT_FRONTEND_URL.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_retry_max_attempts() -> u32 {
    DEFAULT_RETRY_MAX_ATTEMPTS
}

fn default_retry_backoff_ms() -> Vec<u64> {
    DEFAULT_RETRY_BACKOFF_MS.to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend_base_url: default_backend_base_url(),
            frontend_base_url: default_frontend_base_url(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file under `paths`, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(level) = env_non_empty(&["PACEDREAM_LOG_LEVEL"]) {
            self.log_level = level;
        }
        if let Some(url) = env_non_empty(&["PACEDREAM_BACKEND_BASE_URL", "PD_BACKEND_BASE_URL"]) {
            self.backend_base_url = url;
        }
        if let Some(url) = env_non_empty(&["PACEDREAM_FRONTEND_BASE_URL", "PD_FRONTEND_BASE_URL"])
        {
            self.frontend_base_url = url;
        }
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.retry_max_attempts == 0 {
            return Err(CoreError::Config(
                "retry_max_attempts must be at least 1".to_string(),
            ));
        }
        self.api_base_url()?;
        self.frontend_base_url()?;
        Ok(())
    }

    /// Normalized API base URL, e.g. `https://api.pacedream.com/v1`.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        normalize_api_url(&self.backend_base_url)
    }

    /// Normalized frontend base URL.
    pub fn frontend_base_url(&self) -> CoreResult<Url> {
        normalize_frontend_url(&self.frontend_base_url)
    }

    /// Build an endpoint URL under the API base.
    pub fn build_api_url(&self, segments: &[&str]) -> CoreResult<Url> {
        append_segments(&self.api_base_url()?, segments)
    }

    /// Build an endpoint URL under the frontend base.
    pub fn build_frontend_url(&self, segments: &[&str]) -> CoreResult<Url> {
        append_segments(&self.frontend_base_url()?, segments)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff schedule as durations.
    pub fn retry_backoff(&self) -> Vec<Duration> {
        self.retry_backoff_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }
}

fn env_non_empty(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
