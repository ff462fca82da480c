use async_trait::async_trait;
use futures_util::Stream;

use crate::StorageError;

mod memory;
pub use memory::*;

mod fs;
pub use fs::*;

/// A [StorageBackend] is a facade over some generalized storage substrate that
/// is capable of storing, retrieving and removing values by some key
#[async_trait]
pub trait StorageBackend: Clone + Send + Sync {
    /// The key type used by this [StorageBackend]
    type Key: Send + Sync;
    /// The value type able to be stored by this [StorageBackend]
    type Value: Send + Sync;
    /// The error type produced by this [StorageBackend]
    type Error: Into<StorageError> + Send;

    /// Store the given value against the given key
    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error>;
    /// Retrieve a value (if any) stored against the given key
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error>;
    /// Remove the value stored against the given key, reporting whether
    /// anything was there to remove
    async fn remove(&mut self, key: &Self::Key) -> Result<bool, Self::Error>;
}

/// A [StorageSource] is a [StorageBackend] whose entries can be enumerated.
pub trait StorageSource: StorageBackend {
    /// Stream every entry currently held by the backend. Ordering is
    /// unspecified.
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
    + '_;
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use testresult::TestResult;

    use crate::{
        FileSystemStorageBackend, MemoryStorageBackend, StorageBackend, StorageError, StorageSource,
    };

    async fn make_target_storage()
    -> TestResult<(FileSystemStorageBackend<Vec<u8>, Vec<u8>>, tempfile::TempDir)> {
        let root = tempfile::tempdir()?;
        let backend = FileSystemStorageBackend::new(root.path()).await?;
        Ok((backend, root))
    }

    #[tokio::test]
    async fn it_writes_and_reads_a_value() -> TestResult {
        let (mut storage_backend, _tempdir) = make_target_storage().await?;

        storage_backend.set(vec![1, 2, 3], vec![4, 5, 6]).await?;
        let value = storage_backend.get(&vec![1, 2, 3]).await?;

        assert_eq!(value, Some(vec![4, 5, 6]));

        Ok(())
    }

    #[tokio::test]
    async fn it_returns_none_for_missing_keys() -> TestResult {
        let (storage_backend, _tempdir) = make_target_storage().await?;
        assert_eq!(storage_backend.get(&vec![9, 9, 9]).await?, None);

        let memory = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();
        assert_eq!(memory.get(&vec![9, 9, 9]).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn it_overwrites_existing_values() -> TestResult {
        let (mut storage_backend, _tempdir) = make_target_storage().await?;

        storage_backend.set(vec![1], vec![1]).await?;
        storage_backend.set(vec![1], vec![2]).await?;

        assert_eq!(storage_backend.get(&vec![1]).await?, Some(vec![2]));

        Ok(())
    }

    #[tokio::test]
    async fn it_removes_values() -> TestResult {
        let (mut storage_backend, _tempdir) = make_target_storage().await?;
        let mut memory = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();

        storage_backend.set(vec![1, 2], vec![3]).await?;
        memory.set(vec![1, 2], vec![3]).await?;

        assert!(storage_backend.remove(&vec![1, 2]).await?);
        assert!(memory.remove(&vec![1, 2]).await?);

        assert!(!storage_backend.remove(&vec![1, 2]).await?);
        assert!(!memory.remove(&vec![1, 2]).await?);

        assert_eq!(storage_backend.get(&vec![1, 2]).await?, None);
        assert_eq!(memory.get(&vec![1, 2]).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn it_enumerates_all_entries() -> TestResult {
        let (mut storage_backend, _tempdir) = make_target_storage().await?;
        let mut memory = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();

        for i in 0..4usize {
            let key = i.to_le_bytes().to_vec();
            let value = format!("Value{i}").into_bytes();
            storage_backend.set(key.clone(), value.clone()).await?;
            memory.set(key, value).await?;
        }

        let mut from_disk: Vec<_> = storage_backend.read().try_collect().await?;
        let mut from_memory: Vec<_> = memory.read().try_collect().await?;
        from_disk.sort();
        from_memory.sort();

        assert_eq!(from_disk.len(), 4);
        assert_eq!(from_disk, from_memory);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_of_one_key_all_succeed() -> TestResult {
        let (storage_backend, _tempdir) = make_target_storage().await?;

        for round in 0..20u8 {
            let writers: Vec<_> = (0..8u8)
                .map(|writer| {
                    let mut storage_backend = storage_backend.clone();
                    tokio::spawn(async move {
                        storage_backend
                            .set(b"https://auth.test".to_vec(), vec![round, writer])
                            .await
                    })
                })
                .collect();
            for writer in writers {
                writer.await??;
            }

            let value = storage_backend
                .get(&b"https://auth.test".to_vec())
                .await?
                .ok_or("value went missing")?;
            assert_eq!(value[0], round);
        }

        let entries: Vec<_> = storage_backend.read().try_collect().await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, b"https://auth.test".to_vec());

        Ok(())
    }

    #[tokio::test]
    async fn the_empty_key_is_never_present() -> TestResult {
        let (mut storage_backend, _tempdir) = make_target_storage().await?;

        assert_eq!(storage_backend.get(&Vec::new()).await?, None);
        assert!(!storage_backend.remove(&Vec::new()).await?);
        assert!(matches!(
            storage_backend.set(Vec::new(), vec![1]).await,
            Err(StorageError::InvalidKey(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn writes_proceed_while_entries_are_being_read() -> TestResult {
        let mut memory = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();
        memory.set(vec![1], vec![1]).await?;
        memory.set(vec![2], vec![2]).await?;

        let mut writer = memory.clone();
        let entries = memory.read();
        futures_util::pin_mut!(entries);
        let first = entries.try_next().await?.ok_or("no entries")?;

        writer.set(vec![3], vec![3]).await?;

        let rest: Vec<_> = entries.try_collect().await?;
        assert_eq!(rest.len(), 1);
        assert_ne!(rest[0], first);
        assert_eq!(memory.get(&vec![3]).await?, Some(vec![3]));

        Ok(())
    }

    #[tokio::test]
    async fn clones_share_the_same_entries() -> TestResult {
        let memory = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();
        let mut writer = memory.clone();

        writer.set(vec![7], vec![8]).await?;

        assert_eq!(memory.get(&vec![7]).await?, Some(vec![8]));

        Ok(())
    }
}
