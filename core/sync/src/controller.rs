//! Sync cycle controller: decides when to talk to the remote gateway
//! and in which direction, preventing overlapping operations.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use shelfmark_common::{BookRecord, Result};
use shelfmark_remote::{CoverService, LibraryPersistence, SyncDirection, SyncGateway};

use crate::latch::Latch;
use crate::merge::MergeEngine;
use crate::store::LibraryStore;

/// Configuration for the sync cycle controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum interval between autosync rounds. Leading-edge: the
    /// first trigger in a window runs, later triggers are dropped.
    pub throttle_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_secs(30),
        }
    }
}

/// Outcome of one controller-driven sync round.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Locally changed records offered to the gateway.
    pub pushed: usize,
    /// Records returned by the gateway.
    pub pulled: usize,
    /// Matched records reconciled by the merge engine.
    pub updated: usize,
    /// Newly-arrived records appended to the library.
    pub appended: usize,
    /// Wall-clock duration of the round.
    pub duration: Duration,
    /// The trigger was dropped: latched, throttled, or nothing to send.
    pub skipped: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Controller sequencing pull/push/autosync cycles.
///
/// All guards are cooperative check-and-set on atomics, so the
/// at-most-one-in-flight guarantees hold under a multi-threaded runtime
/// as well as a single-threaded one.
pub struct SyncController<G, C, P>
where
    G: SyncGateway + ?Sized,
    C: CoverService + ?Sized,
    P: LibraryPersistence + ?Sized,
{
    /// Remote sync gateway.
    gateway: Arc<G>,
    /// Merge engine consuming returned batches.
    engine: Arc<MergeEngine<C, P>>,
    /// Shared library state.
    store: Arc<LibraryStore>,
    /// Cursor watermark; advanced only after a successful round trip.
    cursor: AtomicI64,
    /// Single-flight latch for pulls.
    pull_in_flight: AtomicBool,
    /// Leading edge of the current autosync window.
    last_autosync: Mutex<Option<Instant>>,
    /// Configuration.
    config: SyncConfig,
}

impl<G, C, P> SyncController<G, C, P>
where
    G: SyncGateway + ?Sized,
    C: CoverService + ?Sized,
    P: LibraryPersistence + ?Sized,
{
    /// Create a new controller.
    pub fn new(
        gateway: Arc<G>,
        engine: Arc<MergeEngine<C, P>>,
        store: Arc<LibraryStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            gateway,
            engine,
            store,
            cursor: AtomicI64::new(0),
            pull_in_flight: AtomicBool::new(false),
            last_autosync: Mutex::new(None),
            config,
        }
    }

    /// Cursor watermark below which local and remote state are assumed
    /// reconciled.
    pub fn last_synced_at(&self) -> i64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Restore a persisted cursor, e.g. at session start.
    pub fn set_last_synced_at(&self, cursor: i64) {
        self.cursor.store(cursor, Ordering::Release);
    }

    /// Fetch remote changes, offering no local changes.
    ///
    /// Single-flight: a pull issued while another is in flight returns
    /// immediately without starting a second request. The latch is
    /// released on every exit path, so a failed pull never blocks the
    /// next one.
    pub async fn pull(&self) -> Result<SyncReport> {
        let Some(_latch) = Latch::acquire(&self.pull_in_flight) else {
            debug!("pull already in flight, skipping");
            return Ok(SyncReport::skipped());
        };
        self.run_round(Vec::new(), SyncDirection::Pull).await
    }

    /// Send locally modified or deleted records without requesting
    /// remote changes. The gateway's echo of the accepted records flows
    /// through the merge engine, stamping `uploaded_at` locally.
    pub async fn push(&self) -> Result<SyncReport> {
        let changes = self.changed_records().await;
        if changes.is_empty() {
            debug!("nothing changed since cursor, push skipped");
            return Ok(SyncReport::skipped());
        }
        self.run_round(changes, SyncDirection::Push).await
    }

    /// Coalesced bidirectional sync, fired on every local library
    /// mutation.
    ///
    /// Leading-edge throttle: the first trigger in a window runs with
    /// the state captured at that moment; triggers inside the window
    /// are dropped, not queued. Their changes are not lost — the next
    /// window re-detects them via the cursor comparison.
    pub async fn auto_sync(&self) -> Result<SyncReport> {
        {
            let mut last = self.last_autosync.lock().unwrap();
            if let Some(at) = *last {
                if at.elapsed() < self.config.throttle_interval {
                    return Ok(SyncReport::skipped());
                }
            }
            *last = Some(Instant::now());
        }

        let changes = self.changed_records().await;
        if changes.is_empty() {
            debug!("nothing changed since cursor, autosync skipped");
            return Ok(SyncReport::skipped());
        }
        self.run_round(changes, SyncDirection::Both).await
    }

    /// Records mutated since the cursor, tombstones included.
    async fn changed_records(&self) -> Vec<BookRecord> {
        let cursor = self.cursor.load(Ordering::Acquire);
        self.store
            .library()
            .await
            .into_iter()
            .filter(|book| book.changed_since(cursor))
            .collect()
    }

    async fn run_round(
        &self,
        changes: Vec<BookRecord>,
        direction: SyncDirection,
    ) -> Result<SyncReport> {
        let start = Instant::now();
        let cursor = self.cursor.load(Ordering::Acquire);
        let pushed = changes.len();
        info!(?direction, pushed, cursor, "starting sync round");

        let batch = self.gateway.sync(changes, cursor, direction).await?;
        let pulled = batch.records.len();
        let next_cursor = batch.last_synced_at;

        let outcome = self.engine.merge(batch.records).await?;
        if !outcome.skipped {
            // Advance only once the batch has actually been applied, so
            // records absorbed by a busy-skipped merge are re-fetched.
            self.cursor.store(next_cursor, Ordering::Release);
        }

        let duration = start.elapsed();
        info!(
            pushed,
            pulled,
            updated = outcome.updated,
            appended = outcome.appended,
            ?duration,
            "sync round complete"
        );

        Ok(SyncReport {
            pushed,
            pulled,
            updated: outcome.updated,
            appended: outcome.appended,
            duration,
            skipped: outcome.skipped,
        })
    }
}
