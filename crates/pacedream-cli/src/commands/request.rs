//! Ad-hoc API call through the refreshing client.

use std::error::Error;

use pacedream_api::{ApiRequest, Method};
use serde_json::Value;
use tracing::debug;

use crate::app::AppContext;

pub async fn request(
    ctx: &AppContext,
    method: &str,
    path: &str,
    body: Option<&str>,
    public: bool,
) -> Result<(), Box<dyn Error>> {
    let request = build_request(method, path, body, public)?;
    debug!(method = %request.method, path = %request.path, "Sending request");

    let response = ctx.auth.client().send(request).await?;
    println!("{}", render_body(&response.body));
    Ok(())
}

fn build_request(
    method: &str,
    path: &str,
    body: Option<&str>,
    public: bool,
) -> Result<ApiRequest, Box<dyn Error>> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
    let mut request = ApiRequest::new(method, path);
    if let Some(body) = body {
        let payload: Value = serde_json::from_str(body)?;
        request = request.json(&payload)?;
    }
    if public {
        request = request.public();
    }
    Ok(request)
}

/// Pretty-print JSON bodies, pass anything else through.
fn render_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_normalizes_method() {
        let request = build_request("post", "bookings", Some(r#"{"listing":"l1"}"#), false).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "bookings");
        assert_eq!(request.body.as_deref(), Some(r#"{"listing":"l1"}"#));
        assert!(request.include_auth);
    }

    #[test]
    fn test_build_request_public() {
        let request = build_request("GET", "listings", None, true).unwrap();
        assert!(!request.include_auth);
        assert!(request.body.is_none());
    }

    #[test]
    fn test_build_request_rejects_bad_body() {
        assert!(build_request("POST", "bookings", Some("{not json"), false).is_err());
    }

    #[test]
    fn test_render_body() {
        assert_eq!(render_body(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
        assert_eq!(render_body("plain text"), "plain text");
    }
}
