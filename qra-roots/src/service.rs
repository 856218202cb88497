//! Three-tier root extraction
//!
//! **Tier 1:** offline corpus cache (location lookup, authoritative)
//! **Tier 2:** online corpus (one page per verse, authoritative)
//! **Tier 3:** weighted consensus over the dictionary and stemmer backends
//!
//! Tiers 1 and 2 need a location; without one only tier 3 runs. A tier that
//! fails is logged and the next tier is tried.

use crate::consensus::ConsensusVerifier;
use crate::discrepancy::{DiscrepancyChecker, DiscrepancyReport};
use crate::error::PipelineResult;
use crate::types::{Location, RootExtractor, VerifiedRoot};
use qra_common::db::TokenStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tier that produced an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    OfflineCache,
    OnlineCorpus,
    Consensus,
}

impl AssignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentMethod::OfflineCache => "offline_cache",
            AssignmentMethod::OnlineCorpus => "online_corpus",
            AssignmentMethod::Consensus => "consensus",
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root chosen for one token, with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootAssignment {
    pub root: String,
    pub sources: BTreeMap<String, String>,
    pub confidence: f64,
    pub agreement_count: usize,
    pub total_sources: usize,
    pub method: AssignmentMethod,
}

impl RootAssignment {
    fn single(source: &str, root: String, confidence: f64, method: AssignmentMethod) -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(source.to_string(), root.clone());
        Self {
            root,
            sources,
            confidence,
            agreement_count: 1,
            total_sources: 1,
            method,
        }
    }

    fn from_consensus(verified: VerifiedRoot) -> Self {
        Self {
            root: verified.root,
            sources: verified.sources,
            confidence: verified.confidence,
            agreement_count: verified.agreement_count,
            total_sources: verified.total_sources,
            method: AssignmentMethod::Consensus,
        }
    }
}

pub struct RootExtractionService {
    offline: Option<Arc<dyn RootExtractor>>,
    online: Option<Arc<dyn RootExtractor>>,
    verifier: ConsensusVerifier,
    checker: DiscrepancyChecker,
}

impl RootExtractionService {
    pub fn new(
        offline: Option<Arc<dyn RootExtractor>>,
        online: Option<Arc<dyn RootExtractor>>,
        verifier: ConsensusVerifier,
        checker: DiscrepancyChecker,
    ) -> Self {
        Self {
            offline,
            online,
            verifier,
            checker,
        }
    }

    pub fn verifier(&self) -> &ConsensusVerifier {
        &self.verifier
    }

    /// Source names in tier order
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .offline
            .iter()
            .chain(self.online.iter())
            .map(|e| e.name().to_string())
            .collect();
        names.extend(self.verifier.extractor_names());
        names
    }

    async fn single_source(
        extractor: &Arc<dyn RootExtractor>,
        word: &str,
        location: &Location,
        method: AssignmentMethod,
    ) -> Option<RootAssignment> {
        let result = extractor.extract_root(word, Some(location)).await;
        if result.has_root() {
            let root = result.root.unwrap_or_default();
            debug!(word, %location, root = %root, %method, "Tier hit");
            return Some(RootAssignment::single(extractor.name(), root, result.confidence, method));
        }

        debug!(
            word,
            %location,
            %method,
            error = result.error.as_deref().unwrap_or("no root"),
            "Tier miss"
        );
        None
    }

    /// Assign a root to `word`, trying each tier in order
    ///
    /// `None` means every tier came back empty.
    pub async fn extract(&self, word: &str, location: Option<&Location>) -> Option<RootAssignment> {
        if let Some(location) = location {
            if let Some(offline) = &self.offline {
                if let Some(assignment) =
                    Self::single_source(offline, word, location, AssignmentMethod::OfflineCache).await
                {
                    return Some(assignment);
                }
            }

            if let Some(online) = &self.online {
                if let Some(assignment) =
                    Self::single_source(online, word, location, AssignmentMethod::OnlineCorpus).await
                {
                    return Some(assignment);
                }
            }
        }

        match self.verifier.verify(word, location).await {
            Some(verified) => Some(RootAssignment::from_consensus(verified)),
            None => {
                warn!(word, location = ?location.map(Location::key), "No root from any tier");
                None
            }
        }
    }

    /// Classification of an assignment's sources
    pub fn classify(&self, word: &str, assignment: &RootAssignment) -> DiscrepancyReport {
        self.checker.check_resolved(word, &assignment.sources)
    }

    /// Status to write for a token that received `assignment`
    pub fn status_for(&self, word: &str, assignment: &RootAssignment) -> TokenStatus {
        self.classify(word, assignment).recommended_status
    }
}

/// Synchronous facade over [`RootExtractionService`]
///
/// Owns one runtime for its whole lifetime; every call blocks on it. Must
/// not be used from inside another tokio runtime.
pub struct BlockingRootExtractor {
    runtime: tokio::runtime::Runtime,
    service: Arc<RootExtractionService>,
}

impl BlockingRootExtractor {
    pub fn new(service: Arc<RootExtractionService>) -> PipelineResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("qra-blocking")
            .enable_all()
            .build()?;
        Ok(Self { runtime, service })
    }

    pub fn extract(&self, word: &str, location: Option<&Location>) -> Option<RootAssignment> {
        self.runtime.block_on(self.service.extract(word, location))
    }

    pub fn extract_many<'a, I>(&self, words: I) -> Vec<(String, Option<RootAssignment>)>
    where
        I: IntoIterator<Item = (&'a str, Option<Location>)>,
    {
        let service = &self.service;
        self.runtime.block_on(async {
            let mut out = Vec::new();
            for (word, location) in words {
                let assignment = service.extract(word, location.as_ref()).await;
                out.push((word.to_string(), assignment));
            }
            out
        })
    }
}
