use async_trait::async_trait;
use dashmap::DashMap;
use macaroon_storage::StorageBackend;

use super::unavailable;
use crate::{PublicKey, StoreError, ThirdPartyKeyStore};

/// Concurrent in-memory location → public key map
#[derive(Debug, Default)]
pub struct MemoryThirdPartyKeyStore {
    keys: DashMap<String, PublicKey>,
}

impl MemoryThirdPartyKeyStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThirdPartyKeyStore for MemoryThirdPartyKeyStore {
    async fn get_public_key(&self, location: &str) -> Result<Option<PublicKey>, StoreError> {
        Ok(self.keys.get(location).map(|entry| *entry.value()))
    }

    async fn set_public_key(&self, location: &str, key: PublicKey) -> Result<(), StoreError> {
        self.keys.insert(location.to_string(), key);
        Ok(())
    }
}

/// Third-party keys kept in a [StorageBackend], one raw 32-byte value per
/// location
#[derive(Clone)]
pub struct PersistentThirdPartyKeyStore<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>>,
{
    backend: Backend,
}

impl<Backend> PersistentThirdPartyKeyStore<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>>,
{
    /// Store public keys in `backend`, keyed by location
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<Backend> ThirdPartyKeyStore for PersistentThirdPartyKeyStore<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>>,
{
    async fn get_public_key(&self, location: &str) -> Result<Option<PublicKey>, StoreError> {
        let stored = self
            .backend
            .get(&location.as_bytes().to_vec())
            .await
            .map_err(unavailable)?;

        stored
            .map(|bytes| {
                PublicKey::try_from(bytes.as_slice())
                    .map_err(|error| StoreError::Corrupt(format!("Key for {location}: {error}")))
            })
            .transpose()
    }

    async fn set_public_key(&self, location: &str, key: PublicKey) -> Result<(), StoreError> {
        let mut backend = self.backend.clone();
        backend
            .set(location.as_bytes().to_vec(), key.as_bytes().to_vec())
            .await
            .map_err(unavailable)?;
        tracing::debug!(location, "Registered third-party public key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;
    use macaroon_storage::MemoryStorageBackend;
    use testresult::TestResult;

    #[tokio::test]
    async fn last_write_wins() -> TestResult {
        let store = MemoryThirdPartyKeyStore::new();
        let first = KeyPair::generate()?.public_key();
        let second = KeyPair::generate()?.public_key();

        assert_eq!(store.get_public_key("https://auth.test").await?, None);

        store.set_public_key("https://auth.test", first).await?;
        store.set_public_key("https://auth.test", second).await?;
        assert_eq!(
            store.get_public_key("https://auth.test").await?,
            Some(second)
        );
        Ok(())
    }

    #[tokio::test]
    async fn persisted_keys_are_read_back() -> TestResult {
        let backend = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();
        let store = PersistentThirdPartyKeyStore::new(backend.clone());
        let key = KeyPair::generate()?.public_key();

        store.set_public_key("https://auth.test", key).await?;

        let reopened = PersistentThirdPartyKeyStore::new(backend);
        assert_eq!(reopened.get_public_key("https://auth.test").await?, Some(key));
        assert_eq!(reopened.get_public_key("https://other.test").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn truncated_keys_are_corrupt() -> TestResult {
        let mut backend = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();
        backend.set(b"https://auth.test".to_vec(), vec![1, 2, 3]).await?;

        let store = PersistentThirdPartyKeyStore::new(backend);
        assert!(matches!(
            store.get_public_key("https://auth.test").await,
            Err(StoreError::Corrupt(_))
        ));
        Ok(())
    }
}
