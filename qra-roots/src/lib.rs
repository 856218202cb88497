//! qra-roots library interface
//!
//! Multi-source root extraction for tokenized verse text: extractor
//! backends, weighted consensus, discrepancy classification, chunked jobs
//! and cross-reference linking. Exposed as a library for the binary and for
//! integration tests.

pub mod arabic;
pub mod cache;
pub mod config;
pub mod consensus;
pub mod db;
pub mod discrepancy;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod rate_limiter;
pub mod reconcile;
pub mod reference_linker;
pub mod service;
pub mod tokenizer;
pub mod types;
pub mod utils;

pub use crate::error::{PipelineError, PipelineResult};

use crate::cache::ResultCache;
use crate::config::PipelineConfig;
use crate::consensus::ConsensusVerifier;
use crate::discrepancy::DiscrepancyChecker;
use crate::extractors::ExtractorRegistry;
use crate::service::RootExtractionService;
use qra_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Everything a job needs, constructed once and passed explicitly
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    /// Database connection pool
    pub db: SqlitePool,
    /// Word-level consensus results shared by all chunks
    pub result_cache: Arc<ResultCache>,
    /// Three-tier extraction over the registered extractors
    pub service: Arc<RootExtractionService>,
    /// Job lifecycle events
    pub event_bus: EventBus,
}

impl PipelineContext {
    /// Assemble a context from already-built parts
    pub fn new(
        config: PipelineConfig,
        db: SqlitePool,
        result_cache: Arc<ResultCache>,
        registry: ExtractorRegistry,
        event_bus: EventBus,
    ) -> PipelineResult<Self> {
        config.validate()?;
        registry.ensure_usable()?;

        let verifier = ConsensusVerifier::new(
            registry.consensus,
            config.weights.clone(),
            config.retry_policy(),
            result_cache.clone(),
        );
        let service = RootExtractionService::new(
            registry.offline,
            registry.online,
            verifier,
            DiscrepancyChecker::new(config.min_sources_for_verification),
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            result_cache,
            service: Arc::new(service),
            event_bus,
        })
    }

    /// Open the database and caches under `root_folder` and build the
    /// configured extractors
    pub async fn open(root_folder: &Path, config: PipelineConfig) -> PipelineResult<Self> {
        let db_path = PipelineConfig::resolve(root_folder, &config.database_file);
        let db = qra_common::db::init_database_with_busy_timeout(&db_path, config.db_max_lock_wait_ms).await?;

        let result_cache = Arc::new(ResultCache::load(PipelineConfig::resolve(
            root_folder,
            &config.result_cache_file,
        )));
        let registry = ExtractorRegistry::from_config(&config, root_folder)?;

        info!(
            root_folder = %root_folder.display(),
            database = %db_path.display(),
            sources = ?registry.names(),
            "Pipeline context ready"
        );

        Self::new(config, db, result_cache, registry, EventBus::default())
    }

    pub fn discrepancy_checker(&self) -> DiscrepancyChecker {
        DiscrepancyChecker::new(self.config.min_sources_for_verification)
    }
}
