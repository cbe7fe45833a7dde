//! Durable library persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use shelfmark_common::{BookRecord, Error, Result};

/// Durable write of the full library snapshot.
#[async_trait]
pub trait LibraryPersistence: Send + Sync {
    async fn persist(&self, records: &[BookRecord]) -> Result<()>;
}

/// JSON snapshot persistence.
///
/// The snapshot is written to a temp file and renamed into place, so a
/// crash mid-write never leaves a truncated library on disk.
pub struct JsonLibraryPersistence {
    path: PathBuf,
}

impl JsonLibraryPersistence {
    /// Create a persistence target at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the last persisted snapshot, or an empty library if none.
    pub async fn load(&self) -> Result<Vec<BookRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).await.map_err(Error::Io)?;
        serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[async_trait]
impl LibraryPersistence for JsonLibraryPersistence {
    async fn persist(&self, records: &[BookRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(Error::Io)?;
        }

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).await.map_err(Error::Io)?;
        fs::rename(&tmp, &self.path).await.map_err(Error::Io)?;
        debug!(count = records.len(), path = %self.path.display(), "library persisted");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonLibraryPersistence::new(dir.path().join("library.json"));
        assert!(persistence.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonLibraryPersistence::new(dir.path().join("library.json"));

        let mut book = BookRecord::new("h1", "Title", "Author", 7);
        book.uploaded_at = Some(9);
        persistence.persist(std::slice::from_ref(&book)).await.unwrap();

        let restored = persistence.load().await.unwrap();
        assert_eq!(restored, vec![book]);

        // Overwrite replaces the snapshot, it does not append.
        persistence.persist(&[]).await.unwrap();
        assert!(persistence.load().await.unwrap().is_empty());
    }
}
