//! Library store: the shared mutable state of the sync core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::{mpsc, RwLock};

use shelfmark_common::BookRecord;

/// Event published to store subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Library snapshot replaced; carries the new length.
    Library(usize),
    /// Syncing indicator toggled.
    Syncing(bool),
    /// Hydration progress fraction in `0..=1`.
    Progress(f64),
}

/// Process-wide library state, explicitly owned and injected.
///
/// Created at application-session start and shared behind an `Arc`
/// between the sync controller, the merge engine, and the UI layer.
/// The merge engine is the only writer of the library array during a
/// cycle; readers get cloned snapshots.
pub struct LibraryStore {
    books: RwLock<Vec<BookRecord>>,
    syncing: AtomicBool,
    progress: RwLock<f64>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl LibraryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_books(Vec::new())
    }

    /// Create a store seeded with a library snapshot, e.g. one loaded
    /// from durable storage at session start.
    pub fn with_books(books: Vec<BookRecord>) -> Self {
        Self {
            books: RwLock::new(books),
            syncing: AtomicBool::new(false),
            progress: RwLock::new(0.0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the current library.
    pub async fn library(&self) -> Vec<BookRecord> {
        self.books.read().await.clone()
    }

    /// Current library length.
    pub async fn library_len(&self) -> usize {
        self.books.read().await.len()
    }

    /// Replace the library snapshot.
    pub async fn set_library(&self, books: Vec<BookRecord>) {
        let len = books.len();
        *self.books.write().await = books;
        self.publish(StoreEvent::Library(len));
    }

    /// Whether a sync cycle with new arrivals is running.
    pub fn syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Toggle the syncing indicator. Idempotent: repeated sets of the
    /// same value publish no event.
    pub fn set_syncing(&self, syncing: bool) {
        if self.syncing.swap(syncing, Ordering::AcqRel) != syncing {
            self.publish(StoreEvent::Syncing(syncing));
        }
    }

    /// Current hydration progress fraction.
    pub async fn progress(&self) -> f64 {
        *self.progress.read().await
    }

    /// Publish a hydration progress fraction.
    pub async fn set_progress(&self, fraction: f64) {
        *self.progress.write().await = fraction;
        self.publish(StoreEvent::Progress(fraction));
    }

    /// Subscribe to store events. The receiver is dropped from the
    /// subscriber list once it is closed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn publish(&self, event: StoreEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for LibraryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_library_replaces_snapshot() {
        let store = LibraryStore::new();
        assert_eq!(store.library_len().await, 0);

        store
            .set_library(vec![BookRecord::new("h1", "T", "A", 1)])
            .await;
        assert_eq!(store.library_len().await, 1);
        assert_eq!(store.library().await[0].hash, "h1");
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let store = LibraryStore::new();
        let mut events = store.subscribe();

        store.set_library(vec![BookRecord::new("h1", "T", "A", 1)]).await;
        store.set_syncing(true);
        store.set_progress(0.5).await;

        assert_eq!(events.recv().await, Some(StoreEvent::Library(1)));
        assert_eq!(events.recv().await, Some(StoreEvent::Syncing(true)));
        assert_eq!(events.recv().await, Some(StoreEvent::Progress(0.5)));
    }

    #[tokio::test]
    async fn test_syncing_toggle_is_idempotent() {
        let store = LibraryStore::new();
        let mut events = store.subscribe();

        store.set_syncing(false);
        store.set_syncing(true);
        store.set_syncing(true);

        assert_eq!(events.recv().await, Some(StoreEvent::Syncing(true)));
        assert!(events.try_recv().is_err());
        assert!(store.syncing());
    }
}
