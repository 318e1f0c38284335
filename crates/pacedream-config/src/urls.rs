//! Base URL normalization and safe URL building.

use crate::{CoreError, CoreResult};
use url::Url;

const API_VERSION_SEGMENT: &str = "v1";
const REDACTED: &str = "[REDACTED]";

fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Normalize the backend base URL into `https://<host>[/prefix]/v1`.
///
/// The `/v1` suffix is appended exactly once, whether or not the raw value
/// already carried it.
pub fn normalize_api_url(raw: &str) -> CoreResult<Url> {
    let cleaned = ensure_scheme(raw);
    let without_version = cleaned
        .strip_suffix("/v1")
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or(cleaned);

    let base = Url::parse(&without_version)?;
    if base.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::Config(format!("Invalid backend URL: {}", raw)));
    }

    append_segments(&base, &[API_VERSION_SEGMENT])
}

/// Normalize the frontend base URL. Never appends `/v1`.
pub fn normalize_frontend_url(raw: &str) -> CoreResult<Url> {
    let cleaned = ensure_scheme(raw);
    let url = Url::parse(&cleaned)?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::Config(format!("Invalid frontend URL: {}", raw)));
    }
    Ok(url)
}

/// Append path segments to a base URL.
///
/// Each segment may itself contain slashes; it is split and blank parts are
/// dropped, so `"auth/refresh-token"` and `("auth", "refresh-token")` build
/// the same URL.
pub fn append_segments(base: &Url, segments: &[&str]) -> CoreResult<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| CoreError::Config(format!("URL cannot be a base: {}", base)))?;
        path.pop_if_empty();
        for segment in segments {
            path.extend(segment.split('/').filter(|part| !part.trim().is_empty()));
        }
    }
    Ok(url)
}

/// Render a URL for logs with credential-like query values masked.
pub fn redact_url(url: &Url) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let lowered = name.to_ascii_lowercase();
            let sensitive = lowered.contains("token")
                || lowered.contains("key")
                || lowered.contains("secret");
            let value = if sensitive {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();

    if pairs.is_empty() {
        return url.to_string();
    }

    let mut redacted = url.clone();
    redacted.set_query(None);
    redacted.query_pairs_mut().extend_pairs(pairs);
    redacted.to_string()
}
