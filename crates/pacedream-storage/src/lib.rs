//! Durable key/value storage for the PaceDream client session.
//!
//! Backends:
//! - **File**: a single JSON document, rewritten atomically on every change
//! - **Memory**: process-local, for tests and throwaway sessions
//!
//! [`SecretsManager`] layers typed accessors (session record, cached user,
//! checkout resume data) over any [`SecureStorage`] backend.

mod file;
mod keys;
mod memory;
mod secrets;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use secrets::{CheckoutResume, SecretsManager, SessionRecord};
pub use traits::SecureStorage;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a file-backed SecretsManager at `path`.
pub fn create_secrets_manager(path: &Path) -> StorageResult<SecretsManager> {
    let storage = FileStorage::open(path)?;
    Ok(SecretsManager::new(Box::new(storage)))
}

/// Create a SecretsManager that keeps everything in memory.
pub fn create_memory_secrets_manager() -> SecretsManager {
    SecretsManager::new(Box::new(MemoryStorage::new()))
}
