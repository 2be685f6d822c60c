//! Credential and user-entity stores
//!
//! The credential store is keyed by credential ID, which is globally
//! unique; the user store owns the username to user-handle mapping and is
//! the only place handles are allocated. Counter updates go through a
//! compare-and-swap so concurrent assertions cannot silently lose an
//! increment.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::webauthn::types::{CredentialRecord, UserEntity};
use crate::webauthn::{Bytes, WebAuthnError};

/// Persistence contract for credential records.
pub trait CredentialStore: Send + Sync {
    fn find_by_id(&self, credential_id: &Bytes) -> Option<CredentialRecord>;

    fn find_by_user(&self, user_handle: &Bytes) -> Vec<CredentialRecord>;

    /// Create or update a record. Inserting a credential ID that already
    /// belongs to another user fails; that uniqueness is the backstop for
    /// concurrent registrations.
    ///
    /// # Errors
    /// Returns `CredentialAlreadyRegistered` on a conflicting insert.
    fn save(&self, record: CredentialRecord) -> Result<(), WebAuthnError>;

    /// Compare-and-swap the usage fields after a successful assertion.
    /// The swap only applies while the stored counter still equals
    /// `expected_sign_count`; a lost race reports a counter regression.
    ///
    /// # Errors
    /// Returns `UnknownCredential` when the record is gone and
    /// `SignCountRegression` when the stored counter moved.
    fn update_usage(
        &self,
        credential_id: &Bytes,
        expected_sign_count: u32,
        new_sign_count: u32,
        backup_state: bool,
        now: DateTime<Utc>,
    ) -> Result<(), WebAuthnError>;

    fn delete(&self, credential_id: &Bytes);
}

/// Username to user entity mapping; the sole source of user handles.
pub trait UserEntityStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Option<UserEntity>;

    fn find_by_handle(&self, user_handle: &Bytes) -> Option<UserEntity>;

    fn save(&self, username: &str, user: UserEntity);
}

/// Mutex-backed credential store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: Mutex<HashMap<Bytes, CredentialRecord>>,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn find_by_id(&self, credential_id: &Bytes) -> Option<CredentialRecord> {
        self.records
            .lock()
            .expect("credential store poisoned")
            .get(credential_id)
            .cloned()
    }

    fn find_by_user(&self, user_handle: &Bytes) -> Vec<CredentialRecord> {
        self.records
            .lock()
            .expect("credential store poisoned")
            .values()
            .filter(|r| &r.user_handle == user_handle)
            .cloned()
            .collect()
    }

    fn save(&self, record: CredentialRecord) -> Result<(), WebAuthnError> {
        let mut records = self.records.lock().expect("credential store poisoned");
        if let Some(existing) = records.get(&record.credential_id) {
            if existing.user_handle != record.user_handle {
                return Err(WebAuthnError::CredentialAlreadyRegistered);
            }
        }
        records.insert(record.credential_id.clone(), record);
        Ok(())
    }

    fn update_usage(
        &self,
        credential_id: &Bytes,
        expected_sign_count: u32,
        new_sign_count: u32,
        backup_state: bool,
        now: DateTime<Utc>,
    ) -> Result<(), WebAuthnError> {
        let mut records = self.records.lock().expect("credential store poisoned");
        let record = records
            .get_mut(credential_id)
            .ok_or(WebAuthnError::UnknownCredential)?;
        if record.sign_count != expected_sign_count {
            return Err(WebAuthnError::SignCountRegression {
                stored: record.sign_count,
                reported: new_sign_count,
            });
        }
        record.sign_count = new_sign_count;
        record.backup_state = backup_state;
        record.last_used = now;
        Ok(())
    }

    fn delete(&self, credential_id: &Bytes) {
        self.records
            .lock()
            .expect("credential store poisoned")
            .remove(credential_id);
    }
}

/// Mutex-backed user entity store.
#[derive(Default)]
pub struct InMemoryUserEntityStore {
    users: Mutex<HashMap<String, UserEntity>>,
}

impl InMemoryUserEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserEntityStore for InMemoryUserEntityStore {
    fn find_by_username(&self, username: &str) -> Option<UserEntity> {
        self.users
            .lock()
            .expect("user store poisoned")
            .get(username)
            .cloned()
    }

    fn find_by_handle(&self, user_handle: &Bytes) -> Option<UserEntity> {
        self.users
            .lock()
            .expect("user store poisoned")
            .values()
            .find(|u| &u.id == user_handle)
            .cloned()
    }

    fn save(&self, username: &str, user: UserEntity) {
        self.users
            .lock()
            .expect("user store poisoned")
            .insert(username.to_string(), user);
    }
}
