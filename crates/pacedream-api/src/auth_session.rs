//! Login, profile bootstrap and sign-out on top of [`ApiClient`].

use crate::auth_fsm::AuthState;
use crate::client::{ApiClient, ApiRequest};
use crate::session::parse_token_response;
use crate::token_store::TokenStore;
use crate::{ApiError, ApiResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Profile endpoints, tried in order.
pub const PROFILE_ENDPOINTS: [&str; 3] = ["account/me", "users/get/profile", "user/get/profile"];

const LOGIN_PATH: &str = "auth/login/email";
const SIGNUP_PATH: &str = "auth/signup/email";

/// Signed-in user's profile summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
    pub phone: Option<String>,
}

impl User {
    /// Parse a profile payload.
    ///
    /// The user object may sit under `data`, under `user` (also nested in
    /// `data`), or at the root. Both `_id`/`id` and camel/snake field names
    /// are accepted.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let root = payload.as_object()?;
        let mut object = root
            .get("data")
            .and_then(Value::as_object)
            .or_else(|| root.get("user").and_then(Value::as_object))
            .unwrap_or(root);
        if let Some(nested) = object.get("user").and_then(Value::as_object) {
            object = nested;
        }

        let id = text(object, &["_id", "id"])?;
        Some(Self {
            id,
            email: text(object, &["email"]),
            first_name: text(object, &["firstName", "first_name"]),
            last_name: text(object, &["lastName", "last_name"]),
            profile_image: text(object, &["profileImage", "profile_image", "avatar"]),
            phone: text(object, &["phone"]),
        })
    }

    /// Full name, first name, email local part, or "User".
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().filter(|name| !name.trim().is_empty());
        let last = self.last_name.as_deref().filter(|name| !name.trim().is_empty());
        let email = self.email.as_deref().filter(|email| !email.trim().is_empty());

        match (first, last, email) {
            (Some(first), Some(last), _) => format!("{} {}", first, last),
            (Some(first), None, _) => first.to_string(),
            (None, _, Some(email)) => email.split('@').next().unwrap_or(email).to_string(),
            _ => "User".to_string(),
        }
    }
}

fn text(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

#[derive(Debug, Serialize)]
struct EmailLoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailRegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    first_name: &'a str,
    last_name: &'a str,
}

/// App-level session: who is signed in and how they got there.
pub struct AuthSession {
    client: ApiClient,
    current_user: RwLock<Option<User>>,
}

impl AuthSession {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            current_user: RwLock::new(None),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn auth_state(&self) -> AuthState {
        self.store().auth_state()
    }

    pub fn current_user(&self) -> Option<User> {
        self.current_user.read().clone()
    }

    fn store(&self) -> &Arc<TokenStore> {
        self.client.token_store()
    }

    /// Load stored tokens and, if there are any, fetch the profile.
    pub async fn initialize(&self) -> ApiResult<AuthState> {
        if self.store().load()?.is_none() {
            debug!("No stored session");
            *self.current_user.write() = None;
            return Ok(self.auth_state());
        }

        match self.fetch_profile().await {
            Ok(_) => {}
            Err(e) if e.requires_reauthentication() => {
                info!("Stored session is no longer valid");
            }
            Err(e) => return Err(e),
        }
        Ok(self.auth_state())
    }

    /// Fetch the profile, trying each endpoint in turn.
    ///
    /// An auth failure signs out. Other failures move on to the next
    /// endpoint, and when all fail the cached profile is used.
    pub async fn fetch_profile(&self) -> ApiResult<Option<User>> {
        for path in PROFILE_ENDPOINTS {
            match self.client.get(path).await {
                Ok(response) => {
                    let payload: Value = match serde_json::from_str(&response.body) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(path, error = %e, "Profile response is not JSON");
                            continue;
                        }
                    };
                    match self.remember_user(&payload)? {
                        Some(user) => return Ok(Some(user)),
                        None => warn!(path, "Profile response carried no user"),
                    }
                }
                Err(e) if e.requires_reauthentication() || e.status() == Some(401) => {
                    warn!(path, error = %e, "Profile request rejected, signing out");
                    self.sign_out()?;
                    return Err(ApiError::SessionExpired);
                }
                Err(e) => {
                    warn!(path, error = %e, "Profile endpoint failed");
                }
            }
        }

        warn!("All profile endpoints failed, using cached user");
        self.load_cached_user()
    }

    /// Sign in with email and password, then fetch the profile.
    pub async fn login_with_email_password(&self, email: &str, password: &str) -> ApiResult<Option<User>> {
        let request = ApiRequest::post(LOGIN_PATH)
            .json(&EmailLoginRequest { email, password })?
            .public();
        let response = self.client.send(request).await?;
        self.store_tokens(&response.body)?;
        info!("Signed in with email");
        self.fetch_profile().await
    }

    /// Create an account, then proceed as after login.
    pub async fn register_with_email_password(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> ApiResult<Option<User>> {
        let request = ApiRequest::post(SIGNUP_PATH)
            .json(&EmailRegisterRequest {
                email,
                password,
                first_name,
                last_name,
            })?
            .public();
        let response = self.client.send(request).await?;
        self.store_tokens(&response.body)?;
        info!("Registered with email");
        self.fetch_profile().await
    }

    /// Forget every stored value.
    pub fn sign_out(&self) -> ApiResult<()> {
        *self.current_user.write() = None;
        self.store().clear_all()?;
        info!("Signed out");
        Ok(())
    }

    fn store_tokens(&self, body: &str) -> ApiResult<()> {
        let session = parse_token_response(body, None)
            .ok_or_else(|| ApiError::Decoding("Invalid response from server".to_string()))?;
        self.store().save(session)?;

        let payload: Value = serde_json::from_str(body)?;
        let user = payload
            .get("data")
            .unwrap_or(&payload)
            .get("user")
            .filter(|user| user.is_object());
        if let Some(user) = user {
            self.remember_user(user)?;
        }
        Ok(())
    }

    fn remember_user(&self, payload: &Value) -> ApiResult<Option<User>> {
        let Some(user) = User::from_payload(payload) else {
            return Ok(None);
        };
        let secrets = self.store().secrets();
        secrets.set_user_id(&user.id)?;
        secrets.set_cached_user(&serde_json::to_string(&user)?)?;
        debug!(user_id = %user.id, "Current user updated");
        *self.current_user.write() = Some(user.clone());
        Ok(Some(user))
    }

    fn load_cached_user(&self) -> ApiResult<Option<User>> {
        let Some(cached) = self.store().secrets().get_cached_user()? else {
            return Ok(self.current_user());
        };
        match serde_json::from_str::<User>(&cached) {
            Ok(user) => {
                *self.current_user.write() = Some(user.clone());
                Ok(Some(user))
            }
            Err(e) => {
                warn!(error = %e, "Cached user is unreadable");
                Ok(self.current_user())
            }
        }
    }
}
