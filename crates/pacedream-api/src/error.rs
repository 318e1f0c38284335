//! API error types.

use crate::executor::TransportErrorKind;
use pacedream_storage::StorageError;
use std::sync::Arc;
use thiserror::Error;

const GENERIC_SERVER_MESSAGE: &str = "Something went wrong. Please try again.";

/// Error returned by every client operation.
///
/// Cloneable so that one outcome can be handed to every caller sharing an
/// in-flight refresh or de-duplicated GET.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// No session is stored; the request was never sent.
    #[error("Not logged in")]
    Unauthenticated,

    /// The refresh token was rejected; the session has been cleared.
    #[error("Session expired")]
    SessionExpired,

    /// Transport failure that persisted through every retry attempt.
    #[error("Network error after {attempts} attempt(s): {message}")]
    Network {
        kind: TransportErrorKind,
        message: String,
        attempts: u32,
    },

    /// Non-2xx response, passed through with status and body intact.
    #[error("HTTP {status}: {}", message.as_deref().unwrap_or(GENERIC_SERVER_MESSAGE))]
    Server {
        status: u16,
        body: String,
        message: Option<String>,
        retry_after: Option<u64>,
    },

    /// An HTML page came back where JSON was expected.
    #[error("Received HTML instead of JSON (HTTP {status})")]
    HtmlResponse { status: u16 },

    /// Gateway error page (502/503/504 served as HTML).
    #[error("Service unavailable (HTTP {status})")]
    ServiceUnavailable { status: u16 },

    /// Response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decoding(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Session persistence failed
    #[error("Storage error: {0}")]
    Storage(Arc<StorageError>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(Arc::new(err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decoding(err.to_string())
    }
}

impl From<pacedream_config::CoreError> for ApiError {
    fn from(err: pacedream_config::CoreError) -> Self {
        ApiError::Config(err.to_string())
    }
}

impl ApiError {
    /// Returns true if repeating the operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network { .. } | ApiError::ServiceUnavailable { .. } => true,
            ApiError::Server { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Returns true if the user must sign in again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, ApiError::Unauthenticated | ApiError::SessionExpired)
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. }
            | ApiError::HtmlResponse { status }
            | ApiError::ServiceUnavailable { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthenticated | ApiError::SessionExpired => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::Network {
                kind: TransportErrorKind::Timeout,
                ..
            } => "Network timeout. Please try again.".to_string(),
            ApiError::Network { .. } => {
                "Network connection error. Please check your connection.".to_string()
            }
            ApiError::Server {
                status: 429,
                retry_after,
                ..
            } => rate_limited_message(*retry_after),
            ApiError::Server { status: 403, .. } => "Access forbidden".to_string(),
            ApiError::Server { status: 404, .. } => "Resource not found".to_string(),
            ApiError::Server { status: 502..=504, .. } | ApiError::ServiceUnavailable { .. } => {
                "Service is temporarily unavailable. Please try again in a minute.".to_string()
            }
            ApiError::Server { message, .. } => message
                .clone()
                .unwrap_or_else(|| GENERIC_SERVER_MESSAGE.to_string()),
            ApiError::HtmlResponse { .. } => {
                "Received unexpected response. Please try again later.".to_string()
            }
            ApiError::Decoding(_) => "Failed to process response.".to_string(),
            ApiError::InvalidUrl(_) | ApiError::Storage(_) | ApiError::Config(_) => {
                "An unexpected error occurred.".to_string()
            }
        }
    }
}

fn rate_limited_message(retry_after: Option<u64>) -> String {
    match retry_after {
        Some(seconds) => {
            let minutes = (seconds / 60).max(1);
            let plural = if minutes > 1 { "s" } else { "" };
            format!(
                "Too many requests. Please try again in {} minute{}.",
                minutes, plural
            )
        }
        None => "Too many requests. Please slow down.".to_string(),
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
