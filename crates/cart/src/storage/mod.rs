//! Device-local key-value persistence.
//!
//! The cart only needs two calls from its storage: read a payload by key and
//! overwrite a payload by key. Both are asynchronous and may fail with
//! [`StorageError::Unavailable`].
//!
//! # Adapters
//!
//! - [`MemoryStore`] - In-process map, shared between clones
//! - [`FileStore`] - One file per key under a directory

use std::future::Future;

use thiserror::Error;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors from a [`KeyValueStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying storage could not be read or written.
    #[error("storage unavailable for key {key}: {source}")]
    Unavailable {
        /// Key being accessed.
        key: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Build an `Unavailable` error for `key`.
    #[must_use]
    pub fn unavailable(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Unavailable {
            key: key.into(),
            source,
        }
    }
}

/// Asynchronous string key-value storage.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read the payload stored under `key`, or `None` if nothing is stored.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Store `payload` under `key`, replacing any previous payload.
    fn set(&self, key: &str, payload: String)
    -> impl Future<Output = Result<(), StorageError>> + Send;
}
