//! Response classification and decoding.

use crate::executor::RawResponse;
use crate::{ApiError, ApiResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A 2xx response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl ApiResponse {
    /// Decode the whole body.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Decode the `data` member of a `{ success, data }` envelope, or the
    /// whole body when there is no envelope.
    pub fn data<T: DeserializeOwned>(&self) -> ApiResult<T> {
        let mut root: Value = serde_json::from_str(&self.body)?;
        let payload = if root.get("data").is_some() {
            root["data"].take()
        } else {
            root
        };
        Ok(serde_json::from_value(payload)?)
    }
}

/// HTML served where JSON was expected (proxy pages, gateway errors).
pub fn is_html_response(content_type: Option<&str>, body: &str) -> bool {
    if content_type.is_some_and(|value| value.to_ascii_lowercase().contains("text/html")) {
        return true;
    }
    let head: String = body.trim_start().chars().take(15).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Pull a human-readable message out of an error body.
///
/// Looks at `message`, `error`, `errors[0]` (string or `{message}`),
/// `data.message` and `data.error`, in that order.
pub fn extract_error_message(body: &str) -> Option<String> {
    let root: Value = serde_json::from_str(body).ok()?;

    let non_blank = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    };

    non_blank(root.get("message"))
        .or_else(|| non_blank(root.get("error")))
        .or_else(|| {
            let first = root.get("errors")?.as_array()?.first()?;
            non_blank(Some(first)).or_else(|| non_blank(first.get("message")))
        })
        .or_else(|| non_blank(root.pointer("/data/message")))
        .or_else(|| non_blank(root.pointer("/data/error")))
}

/// Classify a raw response: 2xx becomes `Ok`, anything else an error that
/// keeps the status and body.
pub(crate) fn into_result(raw: RawResponse) -> ApiResult<ApiResponse> {
    if is_html_response(raw.content_type.as_deref(), &raw.body) {
        return Err(if (502..=504).contains(&raw.status) {
            ApiError::ServiceUnavailable { status: raw.status }
        } else {
            ApiError::HtmlResponse { status: raw.status }
        });
    }

    if raw.is_success() {
        return Ok(ApiResponse {
            status: raw.status,
            content_type: raw.content_type,
            body: raw.body,
        });
    }

    Err(ApiError::Server {
        status: raw.status,
        message: extract_error_message(&raw.body),
        retry_after: raw.retry_after,
        body: raw.body,
    })
}
