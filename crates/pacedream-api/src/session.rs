//! Session token pair and token response parsing.

use chrono::{DateTime, Duration, Utc};
use pacedream_storage::SessionRecord;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Leeway applied when checking local expiry.
pub const EXPIRY_LEEWAY_SECS: i64 = 60;

/// An access/refresh token pair.
///
/// Both tokens are always non-blank. The only way to change a session is to
/// replace it as a whole through the token store.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    /// Returns `None` if either token is blank.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Option<Self> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.trim().is_empty() || refresh_token.trim().is_empty() {
            return None;
        }
        Some(Self {
            access_token,
            refresh_token,
            expires_at: None,
        })
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Expired if `expires_at` falls within the default leeway of now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now(), Duration::seconds(EXPIRY_LEEWAY_SECS))
    }

    /// A session without an expiry never expires locally; the server decides.
    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - leeway <= now,
            None => false,
        }
    }

    /// Build from a persisted record, discarding records with blank tokens.
    pub fn from_record(record: SessionRecord) -> Option<Self> {
        let session = Self::new(record.access_token, record.refresh_token)?;
        Some(Self {
            expires_at: record.expires_at,
            ..session
        })
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Three non-blank dot-separated parts.
pub fn is_valid_jwt_shape(token: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3 && parts.iter().all(|part| !part.trim().is_empty())
}

/// Parse a login or refresh response into a session.
///
/// Accepts `{ success|status: true, data: { accessToken, refreshToken } }`,
/// with tokens optionally at the root and in snake case. When the response
/// carries no refresh token, `previous_refresh_token` is kept.
pub fn parse_token_response(body: &str, previous_refresh_token: Option<&str>) -> Option<Session> {
    let root: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Token response is not JSON");
            return None;
        }
    };
    let root = root.as_object()?;

    if !is_success(root) {
        warn!("Token response indicates failure");
        return None;
    }

    let data = root.get("data").and_then(Value::as_object).unwrap_or(root);

    let access_token = string_field(data, &["accessToken", "access_token"])?;
    if !is_valid_jwt_shape(access_token) {
        warn!("Token response carried a malformed access token");
        return None;
    }

    let refresh_token = string_field(data, &["refreshToken", "refresh_token"])
        .filter(|token| !token.trim().is_empty())
        .or(previous_refresh_token)?;

    let session = Session::new(access_token, refresh_token)?;
    Some(match expiry(data) {
        Some(expires_at) => session.with_expiry(expires_at),
        None => session,
    })
}

fn is_success(root: &Map<String, Value>) -> bool {
    root.get("success").and_then(Value::as_bool) == Some(true)
        || root.get("status").and_then(Value::as_bool) == Some(true)
}

fn string_field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
}

fn expiry(data: &Map<String, Value>) -> Option<DateTime<Utc>> {
    if let Some(seconds) = ["expires_in", "expiresIn"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_i64))
    {
        return Some(Utc::now() + Duration::seconds(seconds));
    }
    ["expiresAt", "expires_at"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}
