use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::StoreError;

/// Number of random bytes in a freshly created root key
pub const ROOT_KEY_LENGTH: usize = 24;

/// A symmetric secret that seeds macaroon signature chains.
///
/// Key bytes are wiped from memory on drop and never appear in [fmt::Debug]
/// output.
#[derive(Clone)]
pub struct RootKey {
    id: String,
    key: Zeroizing<Vec<u8>>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl RootKey {
    /// Assemble a root key record. Keys shorter than [ROOT_KEY_LENGTH] are
    /// refused.
    pub fn new(
        id: String,
        key: Vec<u8>,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, StoreError> {
        let key = Zeroizing::new(key);
        if key.len() < ROOT_KEY_LENGTH {
            return Err(StoreError::Corrupt(format!(
                "Root key {id} is {} bytes, need at least {ROOT_KEY_LENGTH}",
                key.len()
            )));
        }
        Ok(Self {
            id,
            key,
            created_at,
            expires_at,
        })
    }

    /// The identifier macaroons carry
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The secret bytes
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// When the key was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `None` means the key never expires
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True once `now` is past the expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Metadata without key material
    pub fn info(&self) -> RootKeyInfo {
        RootKeyInfo {
            id: self.id.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootKey")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Listing view of a root key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootKeyInfo {
    /// The identifier macaroons carry
    pub id: String,
    /// When the key was created
    pub created_at: DateTime<Utc>,
    /// When the key stops verifying, if ever
    pub expires_at: Option<DateTime<Utc>>,
}
