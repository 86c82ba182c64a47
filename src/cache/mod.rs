//! Offline-first cache for static assets and page resources.
//!
//! This module provides the cache lifecycle of an offline web app:
//! - Install: pre-populate a named bucket from a fixed asset manifest
//! - Fetch: resolve requests over a local bucket and the network under a named policy
//! - Activate: purge buckets left behind by earlier cache generations

mod layer;
mod network;
mod storage;
mod traits;

pub use layer::{CacheLayer, CacheSettings};
pub use network::{HttpNetwork, Network};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{
  CacheRequest, CacheResult, CacheSource, CachedResponse, FetchOutcome, FetchPolicy,
  ResponseType,
};
