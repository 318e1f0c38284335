//! Subcommand handlers.

mod auth;
mod request;

pub use auth::{login, logout, set_session, status};
pub use request::request;
