//! Scripted extractors for integration tests

use async_trait::async_trait;
use qra_roots::rate_limiter::RateLimiter;
use qra_roots::types::{ExtractionResult, Location, RootExtractor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

enum Behavior {
    ByWord(HashMap<String, String>),
    PanicOn(String, HashMap<String, String>),
    Slow(Duration, String),
}

/// Mock extractor answering from a word table, with a call counter
pub struct MockExtractor {
    name: String,
    behavior: Behavior,
    confidence: f64,
    calls: AtomicUsize,
    rate_limiter: RateLimiter,
}

fn table(roots: &[(&str, &str)]) -> HashMap<String, String> {
    roots.iter().map(|(w, r)| (w.to_string(), r.to_string())).collect()
}

impl MockExtractor {
    fn with(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            confidence: 0.8,
            calls: AtomicUsize::new(0),
            rate_limiter: RateLimiter::unlimited(),
        })
    }

    /// Looks the word up in `roots`; unknown words fail
    pub fn by_word(name: &str, roots: &[(&str, &str)]) -> Arc<Self> {
        Self::with(name, Behavior::ByWord(table(roots)))
    }

    /// Like [`by_word`](Self::by_word) but panics on `word`
    pub fn panicking_on(name: &str, word: &str, roots: &[(&str, &str)]) -> Arc<Self> {
        Self::with(name, Behavior::PanicOn(word.to_string(), table(roots)))
    }

    /// Sleeps `delay` before returning `root` for any word
    pub fn slow(name: &str, delay: Duration, root: &str) -> Arc<Self> {
        Self::with(name, Behavior::Slow(delay, root.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, roots: &HashMap<String, String>, word: &str) -> ExtractionResult {
        match roots.get(word) {
            Some(root) => ExtractionResult::success(word, root.clone(), &self.name, self.confidence),
            None => ExtractionResult::failure(word, &self.name, "unknown word"),
        }
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rate_limiter.wait().await;

        match &self.behavior {
            Behavior::ByWord(roots) => self.lookup(roots, word),
            Behavior::PanicOn(trigger, roots) => {
                if word == trigger {
                    panic!("mock extractor {} panicked on {}", self.name, word);
                }
                self.lookup(roots, word)
            }
            Behavior::Slow(delay, root) => {
                tokio::time::sleep(*delay).await;
                ExtractionResult::success(word, root.clone(), &self.name, self.confidence)
            }
        }
    }
}
