use std::{collections::HashMap, sync::Arc};

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::RwLock;

use crate::{StorageError, StorageSource};

use super::StorageBackend;

/// A trivial implementation of [StorageBackend] - backed by a [HashMap] - where
/// all values are kept in memory and never persisted.
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryStorageBackend<Key, Value>
where
    Key: Eq + std::hash::Hash,
    Value: Clone,
{
    entries: Arc<RwLock<HashMap<Key, Value>>>,
}

#[async_trait]
impl<Key, Value> StorageBackend for MemoryStorageBackend<Key, Value>
where
    Key: Clone + Eq + std::hash::Hash + Send + Sync,
    Value: Clone + Send + Sync,
{
    type Key = Key;
    type Value = Value;
    type Error = StorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let mut entries = self.entries.write().await;
        entries.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn remove(&mut self, key: &Self::Key) -> Result<bool, Self::Error> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }
}

impl<Key, Value> StorageSource for MemoryStorageBackend<Key, Value>
where
    Key: Clone + Eq + std::hash::Hash + Send + Sync,
    Value: Clone + Send + Sync,
{
    /// Copies the entries out under the read lock and yields the copy, so the
    /// lock is not held while the consumer polls and writers are not blocked.
    fn read(
        &self,
    ) -> impl Stream<
        Item = Result<
            (
                <Self as StorageBackend>::Key,
                <Self as StorageBackend>::Value,
            ),
            <Self as StorageBackend>::Error,
        >,
    > + Send
    + '_ {
        try_stream! {
            let snapshot: Vec<(Key, Value)> = {
                let entries = self.entries.read().await;
                entries.iter().map(|(key, value)| (key.clone(), value.clone())).collect()
            };
            for (key, value) in snapshot {
                yield (key, value);
            }
        }
    }
}
