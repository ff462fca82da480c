#![warn(missing_docs)]

//! Generalized async key-value storage used to persist macaroon root keys
//! and third-party public keys.
//!
//! A [StorageBackend] stores and retrieves opaque values by key. Two
//! backends ship with this crate:
//!
//! - [MemoryStorageBackend] keeps everything in a shared [std::collections::HashMap]
//!   and is suitable for tests and single-process deployments.
//! - [FileSystemStorageBackend] keeps one file per key inside a root
//!   directory, so values survive restarts.
//!
//! ```rust
//! use macaroon_storage::{MemoryStorageBackend, StorageBackend};
//!
//! # async fn example() -> Result<(), macaroon_storage::StorageError> {
//! let mut backend = MemoryStorageBackend::<Vec<u8>, Vec<u8>>::default();
//! backend.set(b"key".to_vec(), b"value".to_vec()).await?;
//! assert_eq!(backend.get(&b"key".to_vec()).await?, Some(b"value".to_vec()));
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod backend;
pub use backend::*;
