//! Core Types and Trait Definitions
//!
//! - [`RootExtractor`]: the capability every backend implements
//! - [`ExtractionResult`]: one backend's answer for one word
//! - [`VerifiedRoot`]: the consensus outcome persisted in the result cache

use crate::rate_limiter::RateLimiter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use qra_common::db::Location;

// ============================================================================
// Source identities
// ============================================================================

/// Offline location-keyed corpus dump
pub const SOURCE_OFFLINE_CACHE: &str = "offline_corpus_cache";
/// Online word-by-word corpus
pub const SOURCE_ONLINE_CORPUS: &str = "qurancorpus";
/// Curated dictionary A
pub const SOURCE_ALMAANY: &str = "almaany";
/// Curated dictionary B
pub const SOURCE_BAHETH: &str = "baheth";
/// Database-backed heuristic stemmer
pub const SOURCE_PYARABIC: &str = "pyarabic";
/// Rule-based stemmer
pub const SOURCE_ALKHALIL: &str = "alkhalil";

/// Sources whose agreement with the winner lifts confidence to the floor
pub const AUTHORITATIVE_SOURCES: [&str; 2] = [SOURCE_OFFLINE_CACHE, SOURCE_ONLINE_CORPUS];

// ============================================================================
// Extraction result
// ============================================================================

/// One extractor's answer for one word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub word: String,
    pub root: Option<String>,
    pub source: String,
    pub success: bool,
    /// Clamped to 0.0-1.0
    pub confidence: f64,
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn success(
        word: impl Into<String>,
        root: impl Into<String>,
        source: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            word: word.into(),
            root: Some(root.into()),
            source: source.into(),
            success: true,
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
        }
    }

    pub fn failure(
        word: impl Into<String>,
        source: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            word: word.into(),
            root: None,
            source: source.into(),
            success: false,
            confidence: 0.0,
            error: Some(error.into()),
        }
    }

    /// Successful and carrying a non-empty root
    pub fn has_root(&self) -> bool {
        self.success && self.root.as_deref().is_some_and(|r| !r.is_empty())
    }
}

// ============================================================================
// Verified root
// ============================================================================

/// Consensus outcome for a word
///
/// `agreement_count <= total_sources` and `root` is one of the values of
/// `sources`. Immutable once cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedRoot {
    pub word: String,
    pub root: String,
    pub sources: BTreeMap<String, String>,
    pub confidence: f64,
    pub agreement_count: usize,
    pub total_sources: usize,
}

// ============================================================================
// Extractor trait
// ============================================================================

/// Root extraction backend
///
/// `extract_root` never returns an error: every failure (network, parse,
/// missing location, word not found) is reported as
/// `ExtractionResult { success: false, error: Some(..) }`.
#[async_trait]
pub trait RootExtractor: Send + Sync {
    /// Source identity used for weights and provenance
    fn name(&self) -> &str;

    /// Throttle guarding calls to this backend
    fn rate_limiter(&self) -> &RateLimiter;

    /// Extract the root of `word`, optionally at a known location
    async fn extract_root(&self, word: &str, location: Option<&Location>) -> ExtractionResult;
}

// ============================================================================
// Extraction errors
// ============================================================================

/// Internal extractor error, converted to a failed result at the trait boundary
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Remote service returned an error status
    #[error("API error: {0}")]
    Api(String),

    /// Response or file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Location-aware extractor called without a location
    #[error("{0} requires a location (container, verse, position)")]
    MissingLocation(String),

    /// Word (or location) not present in this source
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ExtractionError {
    /// Convert into a failed extraction result for `word` from `source`
    pub fn into_result(self, word: &str, source: &str) -> ExtractionResult {
        ExtractionResult::failure(word, source, self.to_string())
    }
}
