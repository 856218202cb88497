//! Database test utilities

use qra_common::events::EventBus;
use qra_roots::cache::ResultCache;
use qra_roots::config::PipelineConfig;
use qra_roots::extractors::ExtractorRegistry;
use qra_roots::tokenizer::tokenize_str;
use qra_roots::types::RootExtractor;
use qra_roots::PipelineContext;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Create a temporary database with the schema applied
///
/// Returns (TempDir, SqlitePool); the TempDir must outlive the test.
pub async fn create_test_db() -> anyhow::Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_qra.db");
    let pool = qra_common::db::init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Defaults with no backoff between retries
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        retry_backoff_ms: 0,
        max_retries: 1,
        enable_online_corpus: false,
        ..Default::default()
    }
}

/// Context over `pool` whose only extractors are the given consensus voters
pub fn test_context(
    pool: SqlitePool,
    config: PipelineConfig,
    voters: Vec<Arc<dyn RootExtractor>>,
) -> Arc<PipelineContext> {
    let registry = ExtractorRegistry {
        offline: None,
        online: None,
        consensus: voters,
    };
    let ctx = PipelineContext::new(
        config,
        pool,
        Arc::new(ResultCache::in_memory()),
        registry,
        EventBus::new(256),
    )
    .unwrap();
    Arc::new(ctx)
}

/// Insert the tokens of `content` (`c|v|text` lines); returns rows inserted
pub async fn seed_tokens(pool: &SqlitePool, content: &str) -> u64 {
    let tokens = tokenize_str(content);
    qra_roots::db::tokens::insert_tokens(pool, &tokens, 1000).await.unwrap()
}
