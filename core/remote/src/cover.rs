//! Cover hydration service trait and filesystem-backed store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use url::Url;

use shelfmark_common::{BookRecord, Error, Result};

/// Cover hydration service.
///
/// `download_covers` is batched and best-effort per call: it populates a
/// retrievable per-hash cover handle for every record in the batch, or
/// fails the call as a whole. `generate_cover_url` resolves the local
/// handle for a single record.
#[async_trait]
pub trait CoverService: Send + Sync {
    async fn download_covers(&self, records: &[BookRecord]) -> Result<()>;

    async fn generate_cover_url(&self, record: &BookRecord) -> Result<Option<String>>;
}

/// Cover store downloading images over HTTP into a local directory.
///
/// Covers are keyed by record hash; a cover already on disk is not
/// fetched again.
pub struct FsCoverStore {
    base_dir: PathBuf,
    remote_base: Url,
    client: reqwest::Client,
}

impl FsCoverStore {
    /// Create a store rooted at `base_dir`, fetching from `remote_base`.
    pub fn new(base_dir: impl AsRef<Path>, remote_base: Url) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            remote_base,
            client: reqwest::Client::new(),
        }
    }

    fn cover_path(&self, hash: &str) -> PathBuf {
        self.base_dir.join(format!("{hash}.jpg"))
    }

    fn cover_url(&self, hash: &str) -> Result<Url> {
        self.remote_base
            .join(&format!("covers/{hash}.jpg"))
            .map_err(|e| Error::InvalidInput(format!("cover URL for {hash}: {e}")))
    }
}

#[async_trait]
impl CoverService for FsCoverStore {
    async fn download_covers(&self, records: &[BookRecord]) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await.map_err(Error::Io)?;

        for record in records {
            let path = self.cover_path(&record.hash);
            if path.exists() {
                debug!(hash = %record.hash, "cover already on disk");
                continue;
            }

            let url = self.cover_url(&record.hash)?;
            let response = self.client.get(url).send().await.map_err(transfer_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Cover(format!(
                    "cover download for {} returned {status}",
                    record.hash
                )));
            }

            let bytes = response.bytes().await.map_err(transfer_error)?;
            fs::write(&path, &bytes).await.map_err(Error::Io)?;
            debug!(hash = %record.hash, size = bytes.len(), "cover downloaded");
        }

        Ok(())
    }

    async fn generate_cover_url(&self, record: &BookRecord) -> Result<Option<String>> {
        let path = self.cover_path(&record.hash);
        if path.exists() {
            Ok(Some(format!("file://{}", path.display())))
        } else {
            Ok(None)
        }
    }
}

fn transfer_error(err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() {
        Error::Network(err.to_string())
    } else {
        Error::Cover(err.to_string())
    }
}
