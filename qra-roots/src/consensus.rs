//! Weighted consensus verification
//!
//! Every registered extractor is asked for the word's root (with retries);
//! the successful answers vote with per-source trust weights and the winner
//! becomes a [`VerifiedRoot`]. Results are written through to the shared
//! [`ResultCache`], so a word is verified at most once.
//!
//! # Confidence
//! `winner_weight / total_weight`, plus +0.2 when three or more sources
//! agree (+0.1 for exactly two), clamped to 1.0. When an authoritative
//! source agrees with the winner the confidence is at least 0.95.

use crate::cache::ResultCache;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ExtractionResult, Location, RootExtractor, VerifiedRoot, AUTHORITATIVE_SOURCES};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Weight for sources missing from the table
pub const DEFAULT_SOURCE_WEIGHT: f64 = 1.0;

/// Minimum confidence when an authoritative source backs the winner
pub const AUTHORITATIVE_CONFIDENCE_FLOOR: f64 = 0.95;

// ============================================================================
// Source weights
// ============================================================================

/// Trust weight per source name
///
/// Deserializing a partial table overrides only the listed sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, f64>", into = "HashMap<String, f64>")]
pub struct SourceWeights {
    weights: HashMap<String, f64>,
}

impl SourceWeights {
    /// Empty table: every source weighs [`DEFAULT_SOURCE_WEIGHT`]
    pub fn uniform() -> Self {
        Self {
            weights: HashMap::new(),
        }
    }

    pub fn with(mut self, source: &str, weight: f64) -> Self {
        self.weights.insert(source.to_string(), weight);
        self
    }

    pub fn get(&self, source: &str) -> f64 {
        self.weights.get(source).copied().unwrap_or(DEFAULT_SOURCE_WEIGHT)
    }

    /// Every weight must be finite and non-negative
    pub fn validate(&self) -> PipelineResult<()> {
        let mut invalid: Vec<(&String, &f64)> = self
            .weights
            .iter()
            .filter(|(_, weight)| !weight.is_finite() || **weight < 0.0)
            .collect();
        invalid.sort_by(|a, b| a.0.cmp(b.0));

        match invalid.first() {
            Some((source, weight)) => Err(PipelineError::Config(format!(
                "weight for {} must be a finite non-negative number, got {}",
                source, weight
            ))),
            None => Ok(()),
        }
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self::uniform()
            .with(crate::types::SOURCE_OFFLINE_CACHE, 10.0)
            .with(crate::types::SOURCE_ONLINE_CORPUS, 10.0)
            .with(crate::types::SOURCE_ALMAANY, 5.0)
            .with(crate::types::SOURCE_BAHETH, 5.0)
            .with(crate::types::SOURCE_PYARABIC, 5.0)
            .with(crate::types::SOURCE_ALKHALIL, 3.0)
    }
}

impl From<HashMap<String, f64>> for SourceWeights {
    fn from(overrides: HashMap<String, f64>) -> Self {
        let mut weights = SourceWeights::default();
        weights.weights.extend(overrides);
        weights
    }
}

impl From<SourceWeights> for HashMap<String, f64> {
    fn from(weights: SourceWeights) -> Self {
        weights.weights
    }
}

// ============================================================================
// Vote
// ============================================================================

/// One proposed root with its summed weight and raw vote count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub root: String,
    pub weight: f64,
    pub votes: usize,
}

/// Tally successful results per root, in first-seen order
pub fn candidate_scores(results: &[ExtractionResult], weights: &SourceWeights) -> Vec<CandidateScore> {
    let mut candidates: Vec<CandidateScore> = Vec::new();
    for result in results.iter().filter(|r| r.has_root()) {
        let root = result.root.as_deref().unwrap_or_default();
        let weight = weights.get(&result.source);
        match candidates.iter_mut().find(|c| c.root == root) {
            Some(candidate) => {
                candidate.weight += weight;
                candidate.votes += 1;
            }
            None => candidates.push(CandidateScore {
                root: root.to_string(),
                weight,
                votes: 1,
            }),
        }
    }
    candidates
}

/// Compute the consensus over already-collected results
///
/// Returns `None` when no result is successful with a non-empty root.
/// Ties on weighted score go to the candidate seen first in `results`.
pub fn compute_consensus(
    word: &str,
    results: &[ExtractionResult],
    weights: &SourceWeights,
) -> Option<VerifiedRoot> {
    let successful: Vec<&ExtractionResult> = results.iter().filter(|r| r.has_root()).collect();
    let candidates = candidate_scores(results, weights);
    if candidates.is_empty() {
        return None;
    }

    if candidates.len() > 1 {
        let scores: Vec<String> = candidates
            .iter()
            .map(|c| format!("{}={:.1} ({} votes)", c.root, c.weight, c.votes))
            .collect();
        info!(word, candidates = %scores.join(", "), "Sources disagree");
    }

    let mut winner = &candidates[0];
    for candidate in &candidates[1..] {
        if candidate.weight > winner.weight {
            winner = candidate;
        }
    }

    let total_weight: f64 = candidates.iter().map(|c| c.weight).sum();
    let weight_confidence = if total_weight > 0.0 {
        winner.weight / total_weight
    } else {
        0.5
    };

    let agreement_bonus = match winner.votes {
        n if n >= 3 => 0.2,
        2 => 0.1,
        _ => 0.0,
    };

    let mut confidence = (weight_confidence + agreement_bonus).clamp(0.0, 1.0);

    let authoritative_agrees = successful.iter().any(|r| {
        AUTHORITATIVE_SOURCES.contains(&r.source.as_str()) && r.root.as_deref() == Some(winner.root.as_str())
    });
    if authoritative_agrees {
        confidence = confidence.max(AUTHORITATIVE_CONFIDENCE_FLOOR);
    }

    let sources: BTreeMap<String, String> = successful
        .iter()
        .filter_map(|r| r.root.clone().map(|root| (r.source.clone(), root)))
        .collect();

    Some(VerifiedRoot {
        word: word.to_string(),
        root: winner.root.clone(),
        sources,
        confidence,
        agreement_count: winner.votes,
        total_sources: successful.len(),
    })
}

// ============================================================================
// Verifier
// ============================================================================

/// Retry policy for extractor calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per extractor (at least one is always made)
    pub max_retries: u32,
    /// Sleep before retry n is `backoff_base * 2^n` (n starting at 0)
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Multi-source consensus verifier
pub struct ConsensusVerifier {
    extractors: Vec<Arc<dyn RootExtractor>>,
    weights: SourceWeights,
    retry: RetryPolicy,
    cache: Arc<ResultCache>,
}

impl ConsensusVerifier {
    pub fn new(
        extractors: Vec<Arc<dyn RootExtractor>>,
        weights: SourceWeights,
        retry: RetryPolicy,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            extractors,
            weights,
            retry,
            cache,
        }
    }

    pub fn extractor_names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Call one extractor with retries; returns its last result
    async fn extract_with_retry(
        &self,
        extractor: &Arc<dyn RootExtractor>,
        word: &str,
        location: Option<&Location>,
    ) -> ExtractionResult {
        let attempts = self.retry.max_retries.max(1);
        let mut attempt = 0;

        loop {
            let result = extractor.extract_root(word, location).await;
            if result.success {
                return result;
            }

            if attempt + 1 >= attempts {
                warn!(
                    source = extractor.name(),
                    word,
                    attempts,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "All attempts failed"
                );
                return result;
            }

            let backoff = self.retry.backoff_base * 2u32.saturating_pow(attempt);
            debug!(
                source = extractor.name(),
                word,
                attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Extraction failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Verify the root of `word`
    ///
    /// Returns the cached outcome when present. `None` means no extractor
    /// produced a usable root; this is not an error.
    pub async fn verify(&self, word: &str, location: Option<&Location>) -> Option<VerifiedRoot> {
        if let Some(cached) = self.cache.get(word).await {
            debug!(word, root = %cached.root, "Result cache hit");
            return Some(cached);
        }

        let mut results = Vec::with_capacity(self.extractors.len());
        for extractor in &self.extractors {
            results.push(self.extract_with_retry(extractor, word, location).await);
        }

        let verified = compute_consensus(word, &results, &self.weights);
        match &verified {
            Some(v) => {
                info!(
                    word,
                    root = %v.root,
                    confidence = v.confidence,
                    agreement = %format!("{}/{}", v.agreement_count, v.total_sources),
                    "Root verified"
                );
                self.cache.insert(v).await;
            }
            None => warn!(word, "No extractor produced a root"),
        }

        verified
    }
}
