//! In-process key-value store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{KeyValueStore, StorageError};

/// In-memory [`KeyValueStore`].
///
/// Clones share the same map, so a store handed to one session can be
/// reopened by another to simulate an app restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one entry.
    #[must_use]
    pub fn with_entry(key: impl Into<String>, payload: impl Into<String>) -> Self {
        let entries = HashMap::from([(key.into(), payload.into())]);
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Raw payload under `key`, if any.
    pub async fn payload(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, payload: String) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_owned(), payload);
        Ok(())
    }
}
