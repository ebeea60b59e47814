//! Key record persistence contract and an in-memory implementation.

use crate::{
    config::ReenrollmentPolicy,
    crypto::ecdsa::EcPoint,
    error::{AuthError, Result},
};
use dashmap::{mapref::entry::Entry, DashMap};

/// Longest accepted username, in bytes
pub const MAX_USERNAME_LEN: usize = 64;

/// A username bound to the public key it enrolled with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRecord {
    pub username: String,
    pub public_key: EcPoint,
}

/// Storage for key records, keyed by username.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; flows call them concurrently.
///
/// # Atomicity
///
/// `put` **must** decide and write in one step. Two concurrent enrollments
/// for the same username under [`ReenrollmentPolicy::Reject`] must end with
/// exactly one success and one `DuplicateUser`, never a silent overwrite.
pub trait KeyRecordStore: Send + Sync {
    /// Look up the record for `username`.
    fn get(&self, username: &str) -> Result<Option<KeyRecord>>;

    /// Insert `record`, applying `policy` if the username already exists.
    ///
    /// # Errors
    /// `DuplicateUser` under `Reject` when a record exists,
    /// `StoreUnavailable` if the backend fails.
    fn put(&self, record: KeyRecord, policy: ReenrollmentPolicy) -> Result<()>;

    /// Delete the record for `username`, returning whether one existed.
    fn remove(&self, username: &str) -> Result<bool>;
}

/// Check that a username is usable as a store key.
///
/// Non-empty, at most [`MAX_USERNAME_LEN`] bytes, no control characters.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(AuthError::MalformedInput("username is empty".to_string()));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(AuthError::MalformedInput(format!(
            "username longer than {MAX_USERNAME_LEN} bytes"
        )));
    }
    if username.chars().any(char::is_control) {
        return Err(AuthError::MalformedInput(
            "username contains control characters".to_string(),
        ));
    }
    Ok(())
}

/// In-memory store backed by a `DashMap`.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: DashMap<String, EcPoint>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl KeyRecordStore for MemoryKeyStore {
    fn get(&self, username: &str) -> Result<Option<KeyRecord>> {
        Ok(self.records.get(username).map(|entry| KeyRecord {
            username: entry.key().clone(),
            public_key: entry.value().clone(),
        }))
    }

    fn put(&self, record: KeyRecord, policy: ReenrollmentPolicy) -> Result<()> {
        // The entry guard holds the shard lock across check and write.
        match self.records.entry(record.username) {
            Entry::Occupied(mut entry) => match policy {
                ReenrollmentPolicy::Reject => Err(AuthError::DuplicateUser),
                ReenrollmentPolicy::Replace => {
                    entry.insert(record.public_key);
                    Ok(())
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(record.public_key);
                Ok(())
            }
        }
    }

    fn remove(&self, username: &str) -> Result<bool> {
        Ok(self.records.remove(username).is_some())
    }
}
