//! In-memory collaborators for testing and offline development.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use shelfmark_common::{now_millis, BookRecord, Result};

use crate::cover::CoverService;
use crate::gateway::{SyncBatch, SyncDirection, SyncGateway};
use crate::persist::LibraryPersistence;

/// The more recent of a record's mutation timestamps.
fn mutation_stamp(record: &BookRecord) -> i64 {
    record.updated_at.max(record.deleted_at.unwrap_or(0))
}

/// In-memory sync gateway.
///
/// Keeps an authoritative record set keyed by hash the way the real
/// server does: every accepted write is re-stamped `uploaded_at` from a
/// strictly monotonic server clock, and pulls answer with everything
/// accepted since the requested cursor. The monotonic clock keeps
/// cursor comparisons exact even when calls land in the same
/// millisecond.
pub struct MemoryGateway {
    records: RwLock<HashMap<String, BookRecord>>,
    clock: AtomicI64,
    calls: AtomicU32,
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock: AtomicI64::new(now_millis()),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of sync round trips served so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Current server-side record count.
    pub fn record_count(&self) -> usize {
        self.records.read().unwrap().len()
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncGateway for MemoryGateway {
    async fn sync(
        &self,
        local_changes: Vec<BookRecord>,
        last_synced_at: i64,
        direction: SyncDirection,
    ) -> Result<SyncBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let mut records = self.records.write().unwrap();

        let mut accepted = Vec::new();
        if direction != SyncDirection::Pull {
            for mut incoming in local_changes {
                let replace = records
                    .get(&incoming.hash)
                    .map_or(true, |existing| {
                        mutation_stamp(&incoming) >= mutation_stamp(existing)
                    });
                if replace {
                    incoming.uploaded_at = Some(now);
                    records.insert(incoming.hash.clone(), incoming.clone());
                    accepted.push(incoming);
                } else {
                    accepted.push(records[&incoming.hash].clone());
                }
            }
        }

        let out = match direction {
            SyncDirection::Push => accepted,
            SyncDirection::Pull | SyncDirection::Both => records
                .values()
                .filter(|r| r.uploaded_at.unwrap_or(0) > last_synced_at)
                .cloned()
                .collect(),
        };

        Ok(SyncBatch {
            records: out,
            last_synced_at: now,
        })
    }
}

/// In-memory cover service; remembers which hashes were hydrated.
pub struct MemoryCoverService {
    hydrated: RwLock<HashSet<String>>,
    calls: AtomicU32,
}

impl MemoryCoverService {
    pub fn new() -> Self {
        Self {
            hydrated: RwLock::new(HashSet::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Whether a cover for `hash` was downloaded.
    pub fn hydrated(&self, hash: &str) -> bool {
        self.hydrated.read().unwrap().contains(hash)
    }

    /// Number of batched download calls served.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryCoverService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverService for MemoryCoverService {
    async fn download_covers(&self, records: &[BookRecord]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut hydrated = self.hydrated.write().unwrap();
        for record in records {
            hydrated.insert(record.hash.clone());
        }
        Ok(())
    }

    async fn generate_cover_url(&self, record: &BookRecord) -> Result<Option<String>> {
        Ok(Some(format!("memory://covers/{}.jpg", record.hash)))
    }
}

/// In-memory persistence; keeps the last snapshot.
pub struct MemoryPersistence {
    snapshot: RwLock<Vec<BookRecord>>,
    persists: AtomicU32,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Vec::new()),
            persists: AtomicU32::new(0),
        }
    }

    /// The last persisted snapshot.
    pub fn snapshot(&self) -> Vec<BookRecord> {
        self.snapshot.read().unwrap().clone()
    }

    /// Number of persisted snapshots.
    pub fn persist_count(&self) -> u32 {
        self.persists.load(Ordering::SeqCst)
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LibraryPersistence for MemoryPersistence {
    async fn persist(&self, records: &[BookRecord]) -> Result<()> {
        *self.snapshot.write().unwrap() = records.to_vec();
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
