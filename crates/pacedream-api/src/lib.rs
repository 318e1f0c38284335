//! PaceDream API client.
//!
//! Authenticated REST calls with bounded network retry and a single shared
//! token refresh on 401:
//! - [`TokenStore`]: durable session and the auth state machine
//! - [`RequestExecutor`]: one HTTP attempt, no interpretation
//! - [`RefreshCoordinator`]: at most one refresh in flight, outcome shared
//! - [`ApiClient`]: load, send, refresh once, replay once
//! - [`AuthSession`]: login, profile bootstrap, sign-out

pub mod auth_fsm;
pub mod auth_session;
pub mod client;
pub mod error;
pub mod executor;
pub mod refresh;
pub mod response;
pub mod retry;
pub mod session;
pub mod token_store;

#[cfg(test)]
mod testing;

pub use auth_fsm::{AuthState, AuthStateChangedPayload};
pub use auth_session::{AuthSession, User};
pub use client::{ApiClient, ApiRequest};
pub use error::{ApiError, ApiResult};
pub use executor::{
    HttpExecutor, HttpRequest, RawResponse, RequestExecutor, TransportError, TransportErrorKind,
};
pub use refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
pub use response::ApiResponse;
pub use retry::{CallState, RetryPolicy};
pub use session::Session;
pub use token_store::{AuthStateCallback, TokenStore};

pub use reqwest::Method;
