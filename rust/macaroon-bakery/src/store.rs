//! Root key and third-party key stores.

use std::sync::Arc;

use async_trait::async_trait;
use macaroon_storage::StorageError;

use crate::{PublicKey, StoreError};

mod root_key;
pub use root_key::*;

mod memory;
pub use memory::*;

mod persistent;
pub use persistent::*;

mod third_party;
pub use third_party::*;

pub(crate) fn unavailable<E: Into<StorageError>>(error: E) -> StoreError {
    let error: StorageError = error.into();
    StoreError::from(error)
}

/// Creates and looks up the symmetric root keys that seed macaroon
/// signatures. Removing a key revokes every macaroon derived from it.
#[async_trait]
pub trait RootKeyStore: Send + Sync {
    /// Produce a root key that [RootKeyStore::get] will return until it is
    /// revoked or expires
    async fn create(&self) -> Result<RootKey, StoreError>;

    /// Look up a live key. Expired and missing keys both fail with
    /// [StoreError::KeyNotFound].
    async fn get(&self, id: &str) -> Result<RootKey, StoreError>;

    /// Discard a key
    async fn revoke(&self, id: &str) -> Result<(), StoreError>;

    /// Metadata of every stored key, oldest first
    async fn list(&self) -> Result<Vec<RootKeyInfo>, StoreError>;
}

#[async_trait]
impl<T> RootKeyStore for Arc<T>
where
    T: RootKeyStore + ?Sized,
{
    async fn create(&self) -> Result<RootKey, StoreError> {
        (**self).create().await
    }

    async fn get(&self, id: &str) -> Result<RootKey, StoreError> {
        (**self).get(id).await
    }

    async fn revoke(&self, id: &str) -> Result<(), StoreError> {
        (**self).revoke(id).await
    }

    async fn list(&self) -> Result<Vec<RootKeyInfo>, StoreError> {
        (**self).list().await
    }
}

/// Maps third-party locations to the public keys used to seal caveats for
/// them. Last write wins.
#[async_trait]
pub trait ThirdPartyKeyStore: Send + Sync {
    /// The key registered for `location`, if any
    async fn get_public_key(&self, location: &str) -> Result<Option<PublicKey>, StoreError>;

    /// Register or replace the key for `location`
    async fn set_public_key(&self, location: &str, key: PublicKey) -> Result<(), StoreError>;
}

#[async_trait]
impl<T> ThirdPartyKeyStore for Arc<T>
where
    T: ThirdPartyKeyStore + ?Sized,
{
    async fn get_public_key(&self, location: &str) -> Result<Option<PublicKey>, StoreError> {
        (**self).get_public_key(location).await
    }

    async fn set_public_key(&self, location: &str, key: PublicKey) -> Result<(), StoreError> {
        (**self).set_public_key(location, key).await
    }
}
