use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use macaroon_storage::{StorageBackend, StorageSource};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::unavailable;
use crate::{
    Clock, ExpirationPolicy, ROOT_KEY_LENGTH, RootKey, RootKeyInfo, RootKeyStore, StoreError,
    SystemClock, crypto::random_bytes,
};

/// Durable shape of a root key
#[derive(Serialize, Deserialize)]
struct RootKeyRecord {
    id: String,
    key: String,
    created: DateTime<Utc>,
    expires: Option<DateTime<Utc>>,
}

impl RootKeyRecord {
    fn into_root_key(self) -> Result<RootKey, StoreError> {
        let key = STANDARD
            .decode(&self.key)
            .map_err(|error| StoreError::Corrupt(format!("Root key {}: {error}", self.id)))?;
        RootKey::new(self.id, key, self.created, self.expires)
    }
}

/// A [RootKeyStore] over any [StorageBackend], keeping one JSON record per key.
///
/// Every `create` mints a new ULID-named key that stays valid until its
/// lifetime elapses or it is revoked, so several keys can be live at once
/// while clients migrate during rotation.
#[derive(Clone)]
pub struct PersistentRootKeyStore<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>> + StorageSource,
{
    backend: Backend,
    lifetime: ExpirationPolicy,
    clock: Arc<dyn Clock>,
}

impl<Backend> PersistentRootKeyStore<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>> + StorageSource,
{
    /// Keys created by this store live for one year
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            lifetime: ExpirationPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Override how long newly created keys live
    pub fn with_lifetime(mut self, lifetime: ExpirationPolicy) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Judge creation and expiry against `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create a new key for fresh macaroons. Older keys keep verifying until
    /// they expire or are revoked.
    pub async fn rotate(&self) -> Result<RootKey, StoreError> {
        let key = self.create().await?;
        tracing::info!(key_id = key.id(), "Rotated root key");
        Ok(key)
    }

    /// Delete every expired record, returning how many were removed
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut backend = self.backend.clone();
        let mut purged = 0;

        for key in self.load_all().await? {
            if key.is_expired_at(now) {
                backend
                    .remove(&key.id().as_bytes().to_vec())
                    .await
                    .map_err(unavailable)?;
                tracing::info!(key_id = key.id(), "Purged expired root key");
                purged += 1;
            }
        }

        Ok(purged)
    }

    async fn load(&self, id: &str) -> Result<Option<RootKey>, StoreError> {
        let Some(bytes) = self
            .backend
            .get(&id.as_bytes().to_vec())
            .await
            .map_err(unavailable)?
        else {
            return Ok(None);
        };

        let record: RootKeyRecord = serde_json::from_slice(&bytes)
            .map_err(|error| StoreError::Corrupt(format!("Root key {id}: {error}")))?;
        record.into_root_key().map(Some)
    }

    async fn load_all(&self) -> Result<Vec<RootKey>, StoreError> {
        let entries: Vec<(Vec<u8>, Vec<u8>)> =
            self.backend.read().map_err(unavailable).try_collect().await?;

        entries
            .into_iter()
            .map(|(_, bytes)| {
                serde_json::from_slice::<RootKeyRecord>(&bytes)
                    .map_err(|error| StoreError::Corrupt(format!("{error}")))
                    .and_then(RootKeyRecord::into_root_key)
            })
            .collect()
    }
}

#[async_trait]
impl<Backend> RootKeyStore for PersistentRootKeyStore<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>> + StorageSource,
{
    async fn create(&self) -> Result<RootKey, StoreError> {
        let id = Ulid::new().to_string();
        let bytes = random_bytes::<ROOT_KEY_LENGTH>()?;
        let created = self.clock.now();
        let expires = self.lifetime.expiry_from(created).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "Key lifetime of {} {} is out of range",
                self.lifetime.expiration_offset, self.lifetime.expiration_unit
            ))
        })?;

        let record = RootKeyRecord {
            id: id.clone(),
            key: STANDARD.encode(bytes),
            created,
            expires: Some(expires),
        };
        let json =
            serde_json::to_vec(&record).map_err(|error| StoreError::Corrupt(format!("{error}")))?;

        let mut backend = self.backend.clone();
        backend
            .set(id.as_bytes().to_vec(), json)
            .await
            .map_err(unavailable)?;

        tracing::info!(key_id = %id, %expires, "Created root key");
        record.into_root_key()
    }

    async fn get(&self, id: &str) -> Result<RootKey, StoreError> {
        if id.is_empty() {
            return Err(StoreError::KeyNotFound(String::new()));
        }
        match self.load(id).await? {
            Some(key) if !key.is_expired_at(self.clock.now()) => Ok(key),
            Some(_) => {
                tracing::debug!(key_id = id, "Root key has expired");
                Err(StoreError::KeyNotFound(id.to_string()))
            }
            None => Err(StoreError::KeyNotFound(id.to_string())),
        }
    }

    async fn revoke(&self, id: &str) -> Result<(), StoreError> {
        let mut backend = self.backend.clone();
        if backend
            .remove(&id.as_bytes().to_vec())
            .await
            .map_err(unavailable)?
        {
            tracing::info!(key_id = id, "Revoked root key");
            Ok(())
        } else {
            Err(StoreError::KeyNotFound(id.to_string()))
        }
    }

    async fn list(&self) -> Result<Vec<RootKeyInfo>, StoreError> {
        let mut keys: Vec<RootKeyInfo> = self
            .load_all()
            .await?
            .iter()
            .map(RootKey::info)
            .collect();
        keys.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(keys)
    }
}
