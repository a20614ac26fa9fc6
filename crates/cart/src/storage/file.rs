//! File-backed key-value store.
//!
//! Each key maps to `<dir>/<percent-encoded key>.json`. Writes go to a
//! temporary sibling first and are renamed into place, so a crash mid-write
//! leaves the previous payload intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::instrument;

use super::{KeyValueStore, StorageError};

/// [`KeyValueStore`] that keeps one file per key in a directory.
///
/// The directory is created on first write.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the payload files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path used for `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl KeyValueStore for FileStore {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::unavailable(key, e)),
        }
    }

    #[instrument(skip(self, payload), fields(dir = %self.dir.display(), bytes = payload.len()))]
    async fn set(&self, key: &str, payload: String) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::unavailable(key, e))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let written = match tokio::fs::write(&tmp, payload).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // The previous payload is still in place; only the partial copy goes.
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temporary payload");
            }
            return Err(StorageError::unavailable(key, e));
        }

        tracing::debug!(path = %path.display(), "Payload written");
        Ok(())
    }
}
