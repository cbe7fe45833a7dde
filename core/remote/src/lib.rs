//! Shelfmark remote collaborators.
//!
//! The sync core talks to the outside world through three seams: the
//! remote sync gateway, the cover hydration service, and durable library
//! persistence. This module defines those traits and provides:
//! - HTTP gateway and filesystem cover store for production use
//! - JSON snapshot persistence with atomic replace
//! - In-memory doubles for tests and offline development
//! - Retry strategy with exponential backoff for transient errors

pub mod cover;
pub mod gateway;
pub mod memory;
pub mod persist;
pub mod retry;

// Re-export main types
pub use cover::{CoverService, FsCoverStore};
pub use gateway::{HttpSyncGateway, SyncBatch, SyncDirection, SyncGateway};
pub use memory::{MemoryCoverService, MemoryGateway, MemoryPersistence};
pub use persist::{JsonLibraryPersistence, LibraryPersistence};
pub use retry::{retry, retry_with_config, RetryConfig, RetryExecutor};
