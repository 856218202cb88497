//! Offline corpus cache extractor
//!
//! Exact `(container, verse, position)` lookup in the [`LocationCache`].
//! Confidence 1.0; no throttling.

use crate::cache::LocationCache;
use crate::rate_limiter::RateLimiter;
use crate::types::{
    ExtractionError, ExtractionResult, Location, RootExtractor, SOURCE_OFFLINE_CACHE,
};
use async_trait::async_trait;
use std::path::Path;

pub struct OfflineCacheExtractor {
    cache: LocationCache,
    rate_limiter: RateLimiter,
}

impl OfflineCacheExtractor {
    pub fn new(cache: LocationCache) -> Self {
        Self {
            cache,
            rate_limiter: RateLimiter::unlimited(),
        }
    }

    /// Load the cache file; a missing or corrupt file gives an empty cache
    pub fn from_file(path: &Path) -> Self {
        Self::new(LocationCache::load(path))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[async_trait]
impl RootExtractor for OfflineCacheExtractor {
    fn name(&self) -> &str {
        SOURCE_OFFLINE_CACHE
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    async fn extract_root(&self, word: &str, location: Option<&Location>) -> ExtractionResult {
        let Some(location) = location else {
            return ExtractionError::MissingLocation(SOURCE_OFFLINE_CACHE.to_string())
                .into_result(word, SOURCE_OFFLINE_CACHE);
        };

        self.rate_limiter.wait().await;

        match self.cache.get(location) {
            Some(root) => ExtractionResult::success(word, root, SOURCE_OFFLINE_CACHE, 1.0),
            None => ExtractionError::NotFound(format!("position {} not in offline cache", location))
                .into_result(word, SOURCE_OFFLINE_CACHE),
        }
    }
}
