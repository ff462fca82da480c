use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    Clock, ROOT_KEY_LENGTH, RootKey, RootKeyInfo, RootKeyStore, StoreError, SystemClock,
    crypto::random_bytes,
};

/// ID of the single key held by a [MemoryRootKeyStore]
pub const MEMORY_ROOT_KEY_ID: &str = "0";

/// A non-persistent store holding one key under the fixed ID `"0"`.
///
/// Repeated [RootKeyStore::create] calls return the same key until it is
/// revoked, after which the next `create` generates a fresh one. Keys never
/// expire. Suitable for tests and single-process deployments only.
#[derive(Debug, Clone)]
pub struct MemoryRootKeyStore {
    key: Arc<RwLock<Option<RootKey>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryRootKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRootKeyStore {
    /// An empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Stamp creation times from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            key: Arc::new(RwLock::new(None)),
            clock,
        }
    }
}

#[async_trait]
impl RootKeyStore for MemoryRootKeyStore {
    async fn create(&self) -> Result<RootKey, StoreError> {
        let mut slot = self.key.write();
        if let Some(key) = slot.as_ref() {
            return Ok(key.clone());
        }

        let bytes = random_bytes::<ROOT_KEY_LENGTH>()?;
        let key = RootKey::new(
            MEMORY_ROOT_KEY_ID.to_string(),
            bytes.to_vec(),
            self.clock.now(),
            None,
        )?;
        tracing::info!(key_id = MEMORY_ROOT_KEY_ID, "Created in-memory root key");

        *slot = Some(key.clone());
        Ok(key)
    }

    async fn get(&self, id: &str) -> Result<RootKey, StoreError> {
        self.key
            .read()
            .as_ref()
            .filter(|key| key.id() == id)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(id.to_string()))
    }

    async fn revoke(&self, id: &str) -> Result<(), StoreError> {
        let mut slot = self.key.write();
        match slot.as_ref() {
            Some(key) if key.id() == id => {
                *slot = None;
                tracing::info!(key_id = id, "Revoked in-memory root key");
                Ok(())
            }
            _ => Err(StoreError::KeyNotFound(id.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<RootKeyInfo>, StoreError> {
        Ok(self.key.read().iter().map(RootKey::info).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[tokio::test]
    async fn it_returns_the_created_key() -> TestResult {
        let store = MemoryRootKeyStore::new();
        let created = store.create().await?;

        assert_eq!(created.id(), MEMORY_ROOT_KEY_ID);
        assert_eq!(created.key().len(), ROOT_KEY_LENGTH);
        assert_eq!(store.get(created.id()).await?.key(), created.key());
        Ok(())
    }

    #[tokio::test]
    async fn repeated_creates_share_one_key() -> TestResult {
        let store = MemoryRootKeyStore::new();
        let first = store.create().await?;
        let second = store.create().await?;

        assert_eq!(first.key(), second.key());
        assert_eq!(store.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn revoking_discards_the_key() -> TestResult {
        let store = MemoryRootKeyStore::new();
        let first = store.create().await?;

        store.revoke(MEMORY_ROOT_KEY_ID).await?;
        assert!(matches!(
            store.get(MEMORY_ROOT_KEY_ID).await,
            Err(StoreError::KeyNotFound(_))
        ));
        assert!(store.list().await?.is_empty());

        let replacement = store.create().await?;
        assert_ne!(first.key(), replacement.key());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() -> TestResult {
        let store = MemoryRootKeyStore::new();
        store.create().await?;

        assert!(matches!(
            store.get("nonexistent").await,
            Err(StoreError::KeyNotFound(id)) if id == "nonexistent"
        ));
        assert!(store.revoke("nonexistent").await.is_err());
        Ok(())
    }
}
