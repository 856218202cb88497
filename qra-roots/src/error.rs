//! Error types for qra-roots
//!
//! Extractor failures never surface here; they are absorbed into
//! `ExtractionResult { success: false, .. }`. This type covers what can
//! fail around the extractors: configuration, storage, caches and jobs.

use thiserror::Error;
use uuid::Uuid;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or unreadable configuration (fatal at submission)
    #[error("Configuration error: {0}")]
    Config(String),

    /// qra-common error
    #[error("Common error: {0}")]
    Common(#[from] qra_common::Error),

    /// Direct sqlx error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client construction or transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Cache file could not be written
    #[error("Cache error: {0}")]
    Cache(String),

    /// Chunk exceeded its time limit
    #[error("Chunk {chunk_id} timed out after {seconds}s")]
    ChunkTimeout { chunk_id: usize, seconds: u64 },

    /// Job or chunk was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// No job with this id in memory or in the jobs table
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Common(qra_common::Error::Serialization(err))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Common(qra_common::Error::Io(err))
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
