//! Scripted extractors for unit tests

use crate::rate_limiter::RateLimiter;
use crate::types::{ExtractionResult, Location, RootExtractor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

enum Behavior {
    Root(String, f64),
    ByWord(HashMap<String, String>, f64),
    Fail,
    FailTimes(usize, String, f64),
    Panic,
    Slow(Duration, String, f64),
}

/// Mock extractor with a fixed behavior and a call counter
pub struct MockExtractor {
    name: String,
    behavior: Behavior,
    calls: AtomicUsize,
    rate_limiter: RateLimiter,
}

impl MockExtractor {
    fn with(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            rate_limiter: RateLimiter::unlimited(),
        }
    }

    /// Always returns `root`
    pub fn returning(name: &str, root: &str, confidence: f64) -> Self {
        Self::with(name, Behavior::Root(root.to_string(), confidence))
    }

    /// Looks the word up in `roots`; unknown words fail
    pub fn by_word(name: &str, roots: &[(&str, &str)], confidence: f64) -> Self {
        let roots = roots
            .iter()
            .map(|(w, r)| (w.to_string(), r.to_string()))
            .collect();
        Self::with(name, Behavior::ByWord(roots, confidence))
    }

    /// Always fails
    pub fn failing(name: &str) -> Self {
        Self::with(name, Behavior::Fail)
    }

    /// Fails `failures` times, then returns `root`
    pub fn flaky(name: &str, failures: usize, root: &str, confidence: f64) -> Self {
        Self::with(name, Behavior::FailTimes(failures, root.to_string(), confidence))
    }

    /// Panics on every call
    pub fn panicking(name: &str) -> Self {
        Self::with(name, Behavior::Panic)
    }

    /// Sleeps `delay` before returning `root`
    pub fn slow(name: &str, delay: Duration, root: &str) -> Self {
        Self::with(name, Behavior::Slow(delay, root.to_string(), 0.5))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RootExtractor for MockExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    async fn extract_root(&self, word: &str, _location: Option<&Location>) -> ExtractionResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.rate_limiter.wait().await;

        match &self.behavior {
            Behavior::Root(root, confidence) => {
                ExtractionResult::success(word, root.clone(), &self.name, *confidence)
            }
            Behavior::ByWord(roots, confidence) => match roots.get(word) {
                Some(root) => ExtractionResult::success(word, root.clone(), &self.name, *confidence),
                None => ExtractionResult::failure(word, &self.name, "unknown word"),
            },
            Behavior::Fail => ExtractionResult::failure(word, &self.name, "mock failure"),
            Behavior::FailTimes(failures, root, confidence) => {
                if call < *failures {
                    ExtractionResult::failure(word, &self.name, format!("mock failure {}", call + 1))
                } else {
                    ExtractionResult::success(word, root.clone(), &self.name, *confidence)
                }
            }
            Behavior::Panic => panic!("mock extractor {} panicked", self.name),
            Behavior::Slow(delay, root, confidence) => {
                tokio::time::sleep(*delay).await;
                ExtractionResult::success(word, root.clone(), &self.name, *confidence)
            }
        }
    }
}
