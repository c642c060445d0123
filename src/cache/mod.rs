//! Versioned response cache for offline asset serving.
//!
//! This module provides:
//! - A `CacheStore` trait over named generations of request/response pairs
//! - A SQLite-backed store
//! - `CacheManager`, which installs and activates generations and answers
//!   intercepted requests cache-first

mod layer;
mod storage;
mod traits;

pub use layer::{ActivateReport, CacheManager, CachePolicy, InstallReport};
pub use storage::SqliteCacheStore;
pub use traits::{CacheEntry, CacheStore, FetchOutcome};
