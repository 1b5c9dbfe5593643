//! Cache module for storing fetched category data
//!
//! This module provides an expiring cache with a per-entry time-to-live that
//! writes its full state through to a persistent key-value store on every
//! mutation. Expired entries are treated as misses. Storage failures are
//! logged and never interrupt loading.

mod manager;
mod store;

pub use manager::ExpiringCache;
pub use store::{FileStore, KeyValueStore, MemoryStore, StorageError};
