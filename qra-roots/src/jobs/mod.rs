//! Chunked batch jobs
//!
//! A job splits a container's work into contiguous chunks, runs them on a
//! bounded worker pool and aggregates the chunk reports once every chunk
//! has reported.
//!
//! ```text
//! PENDING -> RUNNING -> PROGRESS* -> SUCCESS
//!                                 \-> FAILURE (enumeration or finalize failed)
//! ```
//!
//! Failed chunks do not fail the job; they are counted in
//! [`FinalizedJob::chunks_failed`].

pub mod chunking;
pub mod orchestrator;
mod workers;

pub use chunking::{chunk_token_ids, chunk_verses};
pub use orchestrator::JobOrchestrator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Job kind and state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    RootExtraction,
    Tokenization,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::RootExtraction => "root_extraction",
            JobKind::Tokenization => "tokenization",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = qra_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root_extraction" => Ok(JobKind::RootExtraction),
            "tokenization" => Ok(JobKind::Tokenization),
            other => Err(qra_common::Error::InvalidInput(format!("unknown job kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Progress,
    Success,
    Failure,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Progress => "PROGRESS",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = qra_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            "PROGRESS" => Ok(JobState::Progress),
            "SUCCESS" => Ok(JobState::Success),
            "FAILURE" => Ok(JobState::Failure),
            other => Err(qra_common::Error::InvalidInput(format!("unknown job state: {}", other))),
        }
    }
}

// ============================================================================
// Chunks
// ============================================================================

/// Work assigned to one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkWork {
    /// Token ids for root extraction, in (verse, position) order
    Tokens { ids: Vec<i64> },
    /// Inclusive verse range for tokenization
    Verses { start: i64, end: i64 },
}

impl ChunkWork {
    pub fn len(&self) -> usize {
        match self {
            ChunkWork::Tokens { ids } => ids.len(),
            ChunkWork::Verses { start, end } => (end - start + 1).max(0) as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: usize,
    pub work: ChunkWork,
}

/// Counts from a chunk that ran to completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub tokens_processed: u64,
    pub tokens_updated: u64,
}

/// What a chunk reported to the fan-in barrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub chunk_id: usize,
    pub success: bool,
    pub tokens_processed: u64,
    pub tokens_updated: u64,
    pub error: Option<String>,
}

impl ChunkReport {
    pub fn succeeded(chunk_id: usize, outcome: ChunkOutcome) -> Self {
        Self {
            chunk_id,
            success: true,
            tokens_processed: outcome.tokens_processed,
            tokens_updated: outcome.tokens_updated,
            error: None,
        }
    }

    /// Failed chunks report zero counts even if some batches were committed
    pub fn failed(chunk_id: usize, error: impl Into<String>) -> Self {
        Self {
            chunk_id,
            success: false,
            tokens_processed: 0,
            tokens_updated: 0,
            error: Some(error.into()),
        }
    }
}

/// Aggregate over every chunk report of a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedJob {
    pub tokens_processed: u64,
    pub tokens_updated: u64,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
    pub chunks_total: usize,
}

/// Fan-in aggregation; counts are summed over successful chunks only
pub fn finalize(reports: &[ChunkReport]) -> FinalizedJob {
    reports.iter().fold(
        FinalizedJob {
            chunks_total: reports.len(),
            ..Default::default()
        },
        |mut acc, report| {
            if report.success {
                acc.chunks_succeeded += 1;
                acc.tokens_processed += report.tokens_processed;
                acc.tokens_updated += report.tokens_updated;
            } else {
                acc.chunks_failed += 1;
            }
            acc
        },
    )
}

// ============================================================================
// Job status
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub container: i64,
    pub state: JobState,
    pub progress_percent: f64,
    pub chunks_total: usize,
    pub chunks_completed: usize,
    pub result: Option<FinalizedJob>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn new(job_id: Uuid, kind: JobKind, container: i64, chunks_total: usize) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            kind,
            container,
            state: JobState::Pending,
            progress_percent: 0.0,
            chunks_total,
            chunks_completed: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition_to(&mut self, state: JobState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Record one more reported chunk and recompute the percentage
    pub fn record_chunk(&mut self) {
        self.chunks_completed = (self.chunks_completed + 1).min(self.chunks_total);
        self.progress_percent = progress_percent(self.chunks_completed, self.chunks_total);
        self.transition_to(JobState::Progress);
    }

    pub fn complete(&mut self, result: FinalizedJob) {
        self.result = Some(result);
        self.progress_percent = 100.0;
        self.transition_to(JobState::Success);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.transition_to(JobState::Failure);
    }
}

pub fn progress_percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

/// Handle returned on submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_id: Uuid,
    pub chunks_queued: usize,
}
