use crate::{StorageError, StorageSource};
use async_stream::try_stream;
use async_trait::async_trait;
use base58::{FromBase58, ToBase58};
use futures_util::Stream;
use std::{
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use super::StorageBackend;

const TEMPORARY_SUFFIX: &str = ".partial";

/// Distinguishes concurrent writes of the same key within this process
static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A basic file-system-based [StorageBackend] implementation. All values are
/// stored inside a root directory as files named after their (base58-encoded)
/// keys.
///
/// Writes go to a sibling temporary file first and are moved into place, so a
/// reader never observes a half-written value. Every write gets its own
/// temporary file, so concurrent writers of one key do not trip over each
/// other; the last rename wins.
///
/// The empty key has no file name. It is never present: `get` returns `None`,
/// `remove` returns `false` and `set` fails with [StorageError::InvalidKey].
#[derive(Clone)]
pub struct FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    root_dir: PathBuf,
    key_type: PhantomData<Key>,
    value_type: PhantomData<Value>,
}

impl<Key, Value> FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    /// Creates a new [`FileSystemStorageBackend`] that stores files in
    /// `root_dir`.
    pub async fn new<Pathlike>(root_dir: Pathlike) -> Result<Self, StorageError>
    where
        Pathlike: AsRef<Path>,
    {
        let root_dir = root_dir.as_ref().to_owned();
        tokio::fs::create_dir_all(&root_dir).await?;
        Ok(Self {
            root_dir,
            key_type: PhantomData,
            value_type: PhantomData,
        })
    }

    /// The directory values are stored in
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn make_path(&self, key: &Key) -> Option<PathBuf> {
        let name = key.as_ref().to_base58();
        if name.is_empty() {
            return None;
        }
        Some(self.root_dir.join(name))
    }

    fn make_temporary_path(path: &Path) -> PathBuf {
        let mut partial = path.as_os_str().to_owned();
        partial.push(format!(
            ".{}.{}{TEMPORARY_SUFFIX}",
            std::process::id(),
            WRITE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));
        partial.into()
    }
}

#[async_trait]
impl<Key, Value> StorageBackend for FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone + Send + Sync,
    Value: AsRef<[u8]> + Clone + From<Vec<u8>> + Send + Sync,
{
    type Key = Key;
    type Value = Value;
    type Error = StorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        let Some(path) = self.make_path(&key) else {
            return Err(StorageError::InvalidKey("empty key".into()));
        };
        let partial = Self::make_temporary_path(&path);

        tokio::fs::write(&partial, value).await?;
        if let Err(error) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(error.into());
        }
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        let Some(path) = self.make_path(key) else {
            return Ok(None);
        };
        match tokio::fs::read(path).await {
            Ok(value) => Ok(Some(Value::from(value))),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn remove(&mut self, key: &Self::Key) -> Result<bool, Self::Error> {
        let Some(path) = self.make_path(key) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

impl<Key, Value> StorageSource for FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone + From<Vec<u8>> + Send + Sync,
    Value: AsRef<[u8]> + Clone + From<Vec<u8>> + Send + Sync,
{
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
            let mut entries = tokio::fs::read_dir(&self.root_dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    tracing::debug!(path = ?entry.path(), "Skipping non-UTF-8 file name");
                    continue;
                };
                if name.ends_with(TEMPORARY_SUFFIX) {
                    continue;
                }

                let key = name
                    .from_base58()
                    .map_err(|error| StorageError::InvalidKey(format!("{name}: {error:?}")))?;

                let value = match tokio::fs::read(entry.path()).await {
                    Ok(value) => value,
                    // Removed between listing and reading
                    Err(error) if error.kind() == ErrorKind::NotFound => continue,
                    Err(error) => Err(StorageError::from(error))?,
                };

                yield (Key::from(key), Value::from(value));
            }
        }
    }
}
