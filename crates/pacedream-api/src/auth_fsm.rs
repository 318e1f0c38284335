//! Authentication state machine using rust-fsm.
//!
//! The token store is the only thing that feeds this machine. Every durable
//! session change and every observed 401 is an input.
//!
//! ```text
//!              SessionLoaded / SessionSaved
//!   Unknown ──────────────────────────────────► Authenticated ◄──┐
//!      │                                          │     ▲          │
//!      │ NoSession / Cleared         TokenRejected│     │          │ RefreshSucceeded
//!      ▼                                          ▼     │          │
//!   Unauthenticated ◄──── RefreshFailed ──── AuthenticatedWithRefreshNeeded
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Unknown)

    Unknown => {
        SessionLoaded => Authenticated,
        SessionSaved => Authenticated,
        NoSession => Unauthenticated,
        Cleared => Unauthenticated
    },
    Unauthenticated => {
        SessionLoaded => Authenticated,
        SessionSaved => Authenticated,
        NoSession => Unauthenticated,
        Cleared => Unauthenticated
    },
    Authenticated => {
        SessionLoaded => Authenticated,
        SessionSaved => Authenticated,
        TokenRejected => AuthenticatedWithRefreshNeeded,
        RefreshSucceeded => Authenticated,
        RefreshFailed => Unauthenticated,
        NoSession => Unauthenticated,
        Cleared => Unauthenticated
    },
    AuthenticatedWithRefreshNeeded => {
        SessionSaved => Authenticated,
        TokenRejected => AuthenticatedWithRefreshNeeded,
        RefreshSucceeded => Authenticated,
        RefreshFailed => Unauthenticated,
        NoSession => Unauthenticated,
        Cleared => Unauthenticated
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Authentication state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Storage has not been read yet.
    Unknown,
    /// No session.
    Unauthenticated,
    /// A session exists and was not rejected.
    Authenticated,
    /// The server rejected the access token; a refresh is pending or due.
    AuthenticatedWithRefreshNeeded,
}

impl AuthState {
    /// True while a session is held, including one awaiting refresh.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            AuthState::Authenticated | AuthState::AuthenticatedWithRefreshNeeded
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Unknown => AuthState::Unknown,
            AuthMachineState::Unauthenticated => AuthState::Unauthenticated,
            AuthMachineState::Authenticated => AuthState::Authenticated,
            AuthMachineState::AuthenticatedWithRefreshNeeded => {
                AuthState::AuthenticatedWithRefreshNeeded
            }
        }
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthState::Unknown => "unknown",
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticated => "authenticated",
            AuthState::AuthenticatedWithRefreshNeeded => "authenticated_with_refresh_needed",
        };
        f.write_str(name)
    }
}

/// Payload for auth state change events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    pub state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}
