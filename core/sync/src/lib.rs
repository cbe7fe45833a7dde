//! Shelfmark library synchronization core.
//!
//! This module reconciles the locally-held library against the remote
//! collection, providing:
//! - A sync cycle controller with single-flight pulls and a
//!   leading-edge autosync throttle
//! - A merge engine resolving per-record conflicts by recency, with
//!   batched cover hydration and incremental progress reporting
//! - An injected library store shared with the surrounding application

pub mod controller;
mod latch;
pub mod merge;
pub mod store;

// Re-export main types
pub use controller::{SyncConfig, SyncController, SyncReport};
pub use merge::{MergeConfig, MergeEngine, MergeOutcome};
pub use store::{LibraryStore, StoreEvent};
