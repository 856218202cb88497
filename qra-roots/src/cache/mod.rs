//! Disk-persisted caches
//!
//! - [`ResultCache`]: word to consensus outcome, shared by all chunk workers
//! - [`LocationCache`]: location key to root, the offline corpus dump

pub mod location_cache;
pub mod result_cache;

pub use location_cache::{LocationCache, LocationCacheMetadata};
pub use result_cache::ResultCache;
