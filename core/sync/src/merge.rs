//! Merge engine: reconciles the local library with a synced batch.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, info, warn};

use shelfmark_common::{now_millis, BookRecord, Result};
use shelfmark_remote::{CoverService, LibraryPersistence};

use crate::latch::Latch;
use crate::store::LibraryStore;

/// Configuration for the merge engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MergeConfig {
    /// Batch size for hydrating covers of already-known records.
    pub existing_cover_batch: usize,
    /// Batch size for hydrating and appending newly-arrived records.
    ///
    /// Smaller than `existing_cover_batch` because each arrival also
    /// needs cover URL generation and an append plus a store commit.
    pub arrival_batch: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            existing_cover_batch: 20,
            arrival_batch: 10,
        }
    }
}

/// Outcome of one merge cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The cycle was skipped because another merge was in progress.
    pub skipped: bool,
    /// Matched records whose fields were reconciled.
    pub updated: usize,
    /// Newly-arrived records appended to the library.
    pub appended: usize,
}

impl MergeOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Merge engine for reconciling the library with synced batches.
pub struct MergeEngine<C: CoverService + ?Sized, P: LibraryPersistence + ?Sized> {
    /// Cover hydration service.
    covers: Arc<C>,
    /// Durable persistence for the merged snapshot.
    persistence: Arc<P>,
    /// Shared library state.
    store: Arc<LibraryStore>,
    /// Busy flag; merges never overlap.
    busy: AtomicBool,
    /// Configuration.
    config: MergeConfig,
}

impl<C: CoverService + ?Sized, P: LibraryPersistence + ?Sized> MergeEngine<C, P> {
    /// Create a new merge engine.
    pub fn new(
        covers: Arc<C>,
        persistence: Arc<P>,
        store: Arc<LibraryStore>,
        config: MergeConfig,
    ) -> Self {
        Self {
            covers,
            persistence,
            store,
            busy: AtomicBool::new(false),
            config,
        }
    }

    /// Reconcile the local library with a freshly-synced batch.
    ///
    /// Not re-entrant: a merge triggered while another is running is a
    /// silent no-op, as is an empty batch. Partial arrival batches that
    /// were already committed stay committed if a later batch fails.
    pub async fn merge(&self, mut synced: Vec<BookRecord>) -> Result<MergeOutcome> {
        if synced.is_empty() {
            return Ok(MergeOutcome::default());
        }
        let Some(_busy) = Latch::acquire(&self.busy) else {
            warn!(batch = synced.len(), "merge already in progress, skipping");
            return Ok(MergeOutcome::skipped());
        };

        // Later updated_at values are applied last when a hash repeats
        // within one batch.
        synced.sort_by_key(|b| b.updated_at);
        let mut by_hash: HashMap<&str, &BookRecord> = HashMap::new();
        for record in &synced {
            by_hash.insert(record.hash.as_str(), record);
        }

        let local = self.store.library().await;
        let local_hashes: HashSet<&str> = local.iter().map(|b| b.hash.as_str()).collect();

        // Reconcile matched records, queueing covers that still need
        // hydration. Hydration targets the local record: its file handle
        // already exists, only the cover is missing.
        let mut working = Vec::with_capacity(local.len());
        let mut needs_cover = Vec::new();
        let mut updated = 0;
        for book in &local {
            let merged = match by_hash.get(book.hash.as_str()) {
                Some(synced_book) => {
                    if !synced_book.is_tombstone()
                        && synced_book.uploaded_at.is_some()
                        && book.cover_downloaded_at.is_none()
                    {
                        needs_cover.push(book.clone());
                    }
                    updated += 1;
                    BookRecord::resolve(book, synced_book)
                }
                // Not in the batch; untouched.
                None => book.clone(),
            };
            working.push(merged);
        }

        if !needs_cover.is_empty() {
            debug!(count = needs_cover.len(), "hydrating covers for matched records");
            let index: HashMap<String, usize> = working
                .iter()
                .enumerate()
                .map(|(i, b)| (b.hash.clone(), i))
                .collect();
            for batch in needs_cover.chunks(self.config.existing_cover_batch) {
                self.covers.download_covers(batch).await?;
                let stamped = now_millis();
                for book in batch {
                    if let Some(&i) = index.get(&book.hash) {
                        working[i].cover_downloaded_at = Some(stamped);
                    }
                }
            }
        }

        // Newly-arrived records: unknown hash, not tombstoned, and
        // already accepted remotely. Records still mid-upload from
        // another device are not considered arrived.
        let mut arrivals: Vec<BookRecord> = by_hash
            .values()
            .filter(|b| {
                !local_hashes.contains(b.hash.as_str())
                    && !b.is_tombstone()
                    && b.uploaded_at.is_some()
            })
            .map(|b| (*b).clone())
            .collect();
        arrivals.sort_by_key(|b| b.updated_at);

        let appended = arrivals.len();
        if appended > 0 {
            self.store.set_syncing(true);
            info!(count = appended, "importing newly arrived records");
        }

        let arrival_result = self.append_arrivals(&mut working, &arrivals).await;
        // The syncing indicator clears on every exit path.
        self.store.set_syncing(false);
        arrival_result?;

        self.persistence.persist(&working).await?;
        self.store.set_library(working).await;
        info!(updated, appended, "merge cycle complete");

        Ok(MergeOutcome {
            skipped: false,
            updated,
            appended,
        })
    }

    /// Hydrate and append arrivals in batches, committing a partial
    /// snapshot and a progress fraction after each batch.
    async fn append_arrivals(
        &self,
        working: &mut Vec<BookRecord>,
        arrivals: &[BookRecord],
    ) -> Result<()> {
        let total = arrivals.len();
        let mut processed = 0usize;

        for batch in arrivals.chunks(self.config.arrival_batch) {
            self.covers.download_covers(batch).await?;
            let stamped = now_millis();
            for record in batch {
                let mut record = record.clone();
                record.cover_image_url = self.covers.generate_cover_url(&record).await?;
                record.cover_downloaded_at = Some(stamped);
                working.push(record);
            }

            processed += batch.len();
            self.store.set_library(working.clone()).await;
            let fraction = (processed as f64 / total as f64).min(1.0);
            self.store.set_progress(fraction).await;
            debug!(processed, total, "arrival batch committed");
        }

        Ok(())
    }
}
