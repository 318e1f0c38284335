//! High-level API for the values the client persists.

use crate::{SecureStorage, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted token pair.
///
/// Stored as one JSON value under [`StorageKeys::SESSION`] so that access and
/// refresh tokens are always written and read together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Checkout to resume after the app relaunches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutResume {
    pub session_id: String,
    pub booking_type: Option<String>,
}

/// High-level API for storing and retrieving client secrets
pub struct SecretsManager {
    storage: Box<dyn SecureStorage>,
}

impl SecretsManager {
    /// Create a new secrets manager with the given storage backend
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Session
    // ==========================================

    /// Retrieve the stored token pair
    pub fn get_session_record(&self) -> StorageResult<Option<SessionRecord>> {
        match self.storage.get(StorageKeys::SESSION)? {
            Some(json) => {
                let record: SessionRecord = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Store the token pair in a single write
    pub fn set_session_record(&self, record: &SessionRecord) -> StorageResult<()> {
        let json =
            serde_json::to_string(record).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::SESSION, &json)
    }

    pub fn has_session_record(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::SESSION)
    }

    /// Remove only the token pair (cached profile data stays)
    pub fn clear_session_record(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::SESSION)?;
        Ok(())
    }

    // ==========================================
    // User
    // ==========================================

    pub fn set_user_id(&self, user_id: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::USER_ID, user_id)
    }

    pub fn get_user_id(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::USER_ID)
    }

    /// Store the raw profile payload for offline display
    pub fn set_cached_user(&self, payload: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::CACHED_USER, payload)
    }

    pub fn get_cached_user(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::CACHED_USER)
    }

    // ==========================================
    // Checkout resume
    // ==========================================

    pub fn set_checkout_resume(&self, resume: &CheckoutResume) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::CHECKOUT_SESSION_ID, &resume.session_id)?;
        match &resume.booking_type {
            Some(booking_type) => self
                .storage
                .set(StorageKeys::CHECKOUT_BOOKING_TYPE, booking_type),
            None => self
                .storage
                .delete(StorageKeys::CHECKOUT_BOOKING_TYPE)
                .map(|_| ()),
        }
    }

    pub fn get_checkout_resume(&self) -> StorageResult<Option<CheckoutResume>> {
        let Some(session_id) = self.storage.get(StorageKeys::CHECKOUT_SESSION_ID)? else {
            return Ok(None);
        };
        Ok(Some(CheckoutResume {
            session_id,
            booking_type: self.storage.get(StorageKeys::CHECKOUT_BOOKING_TYPE)?,
        }))
    }

    pub fn clear_checkout_resume(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::CHECKOUT_SESSION_ID)?;
        self.storage.delete(StorageKeys::CHECKOUT_BOOKING_TYPE)?;
        Ok(())
    }

    // ==========================================
    // Clear All
    // ==========================================

    /// Clear every stored value (sign out).
    ///
    /// Attempts every key even if one fails, then reports the first failure.
    pub fn clear_all(&self) -> StorageResult<()> {
        let mut first_error = None;
        for key in StorageKeys::ALL {
            if let Err(e) = self.storage.delete(key) {
                tracing::warn!(key, error = %e, "Failed to delete stored value");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    fn manager() -> SecretsManager {
        SecretsManager::new(Box::new(MemoryStorage::new()))
    }

    #[test]
    fn test_session_record_roundtrip_and_clear() {
        let manager = manager();
        assert!(!manager.has_session_record().unwrap());

        let record = SessionRecord {
            access_token: "a.b.c".to_string(),
            refresh_token: "r1".to_string(),
            expires_at: Some(Utc::now()),
        };
        manager.set_session_record(&record).unwrap();
        assert_eq!(manager.get_session_record().unwrap(), Some(record));

        manager.clear_session_record().unwrap();
        assert!(manager.get_session_record().unwrap().is_none());
    }

    #[test]
    fn test_session_record_without_expiry_omits_field() {
        let record = SessionRecord {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("expires_at"));
    }

    #[test]
    fn test_corrupt_session_record_is_encoding_error() {
        let storage = MemoryStorage::new();
        storage.set(StorageKeys::SESSION, "{broken").unwrap();
        let manager = SecretsManager::new(Box::new(storage));
        assert!(matches!(
            manager.get_session_record(),
            Err(StorageError::Encoding(_))
        ));
    }

    #[test]
    fn test_clear_session_keeps_cached_user() {
        let manager = manager();
        manager
            .set_session_record(&SessionRecord {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
                expires_at: None,
            })
            .unwrap();
        manager.set_cached_user(r#"{"id":"u1"}"#).unwrap();

        manager.clear_session_record().unwrap();
        assert!(manager.get_cached_user().unwrap().is_some());

        manager.clear_all().unwrap();
        assert!(manager.get_cached_user().unwrap().is_none());
    }

    #[test]
    fn test_checkout_resume() {
        let manager = manager();
        assert!(manager.get_checkout_resume().unwrap().is_none());

        let resume = CheckoutResume {
            session_id: "cs_123".to_string(),
            booking_type: Some("hourly".to_string()),
        };
        manager.set_checkout_resume(&resume).unwrap();
        assert_eq!(manager.get_checkout_resume().unwrap(), Some(resume));

        manager
            .set_checkout_resume(&CheckoutResume {
                session_id: "cs_456".to_string(),
                booking_type: None,
            })
            .unwrap();
        let stored = manager.get_checkout_resume().unwrap().unwrap();
        assert_eq!(stored.booking_type, None);

        manager.clear_checkout_resume().unwrap();
        assert!(manager.get_checkout_resume().unwrap().is_none());
    }

    #[test]
    fn test_storage_keys_are_unique() {
        let unique: std::collections::HashSet<_> = StorageKeys::ALL.iter().collect();
        assert_eq!(unique.len(), StorageKeys::ALL.len());
    }
}
