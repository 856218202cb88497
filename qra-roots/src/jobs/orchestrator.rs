//! Job orchestration: fan-out to a bounded worker pool, fan-in barrier
//!
//! Each chunk runs as its own task under a per-chunk timeout. Whatever
//! happens to a chunk (error, panic, timeout, cancellation) ends up as a
//! [`ChunkReport`]; the barrier waits for every report before finalizing.
//!
//! Live status is kept in memory (one watch channel per job) and mirrored
//! to the `jobs` table on every change.

use super::workers::{run_extraction_chunk, run_tokenization_chunk};
use super::{
    chunk_token_ids, chunk_verses, finalize, progress_percent, Chunk, ChunkReport, ChunkWork,
    FinalizedJob, JobKind, JobState, JobStatus, SubmittedJob,
};
use crate::db;
use crate::error::{PipelineError, PipelineResult};
use crate::tokenizer::VerseText;
use crate::PipelineContext;
use chrono::Utc;
use qra_common::events::PipelineEvent;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct JobEntry {
    status: watch::Sender<JobStatus>,
    cancel: CancellationToken,
}

/// What the chunks of a job operate on
#[derive(Clone)]
enum JobPlan {
    RootExtraction,
    Tokenization { verses: Arc<Vec<VerseText>> },
}

#[derive(Clone)]
pub struct JobOrchestrator {
    ctx: Arc<PipelineContext>,
    jobs: Arc<RwLock<HashMap<Uuid, Arc<JobEntry>>>>,
    chunk_timeout: Duration,
}

impl JobOrchestrator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let chunk_timeout = ctx.config.chunk_timeout();
        Self {
            ctx,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            chunk_timeout,
        }
    }

    /// Override the per-chunk time limit from the configuration
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Queue root extraction for every MISSING token of `container`
    pub async fn submit_root_extraction(
        &self,
        container: i64,
        chunk_size: Option<usize>,
    ) -> PipelineResult<SubmittedJob> {
        let chunk_size = chunk_size.unwrap_or(self.ctx.config.chunk_size);
        let ids = db::tokens::missing_token_ids(&self.ctx.db, container).await?;
        let chunks = chunk_token_ids(&ids, chunk_size)?;

        info!(container, tokens = ids.len(), chunk_size, chunks = chunks.len(), "Submitting root extraction");
        self.launch(JobKind::RootExtraction, container, chunks, JobPlan::RootExtraction)
            .await
    }

    /// Queue tokenization of `verses` (only those of `container` are used)
    pub async fn submit_tokenization(
        &self,
        container: i64,
        verses: Vec<VerseText>,
        chunk_size: Option<usize>,
    ) -> PipelineResult<SubmittedJob> {
        let chunk_size = chunk_size.unwrap_or(self.ctx.config.tokenize_chunk_size);

        let mut verses: Vec<VerseText> = verses.into_iter().filter(|v| v.container == container).collect();
        verses.sort_by_key(|v| v.verse);
        verses.dedup_by_key(|v| v.verse);
        let numbers: Vec<i64> = verses.iter().map(|v| v.verse).collect();
        let chunks = chunk_verses(&numbers, chunk_size)?;

        info!(container, verses = verses.len(), chunk_size, chunks = chunks.len(), "Submitting tokenization");
        self.launch(
            JobKind::Tokenization,
            container,
            chunks,
            JobPlan::Tokenization {
                verses: Arc::new(verses),
            },
        )
        .await
    }

    async fn launch(
        &self,
        kind: JobKind,
        container: i64,
        chunks: Vec<Chunk>,
        plan: JobPlan,
    ) -> PipelineResult<SubmittedJob> {
        let job_id = Uuid::new_v4();
        let status = JobStatus::new(job_id, kind, container, chunks.len());
        db::jobs::save_job(&self.ctx.db, &status, self.ctx.config.db_max_lock_wait_ms).await?;

        let (tx, _rx) = watch::channel(status);
        let entry = Arc::new(JobEntry {
            status: tx,
            cancel: CancellationToken::new(),
        });
        self.jobs.write().await.insert(job_id, entry.clone());

        self.ctx.event_bus.emit_lossy(PipelineEvent::JobQueued {
            job_id,
            kind: kind.as_str().to_string(),
            container,
            chunks_total: chunks.len(),
            timestamp: Utc::now(),
        });

        let chunks_queued = chunks.len();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run_job(job_id, entry, chunks, plan).await;
        });

        Ok(SubmittedJob {
            job_id,
            chunks_queued,
        })
    }

    // ========================================================================
    // Status and control
    // ========================================================================

    async fn entry(&self, job_id: Uuid) -> Option<Arc<JobEntry>> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    /// Current status; falls back to the `jobs` table for jobs of other processes
    pub async fn job_status(&self, job_id: Uuid) -> PipelineResult<JobStatus> {
        if let Some(entry) = self.entry(job_id).await {
            return Ok(entry.status.borrow().clone());
        }

        db::jobs::load_job(&self.ctx.db, job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job_id))
    }

    /// Wait until the job reaches SUCCESS or FAILURE
    pub async fn wait_for_job(&self, job_id: Uuid) -> PipelineResult<JobStatus> {
        let Some(entry) = self.entry(job_id).await else {
            return self.job_status(job_id).await;
        };

        let mut rx = entry.status.subscribe();
        let status = rx
            .wait_for(|status| status.state.is_terminal())
            .await
            .map_err(|_| PipelineError::Internal(format!("status channel for job {} closed", job_id)))?;
        Ok(status.clone())
    }

    /// Request cancellation; returns false when the job is unknown or finished
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let Some(entry) = self.entry(job_id).await else {
            return false;
        };
        if entry.status.borrow().state.is_terminal() {
            return false;
        }

        info!(job_id = %job_id, "Cancelling job");
        entry.cancel.cancel();
        true
    }

    /// Cancel every job that has not finished
    pub async fn cancel_all(&self) {
        for entry in self.jobs.read().await.values() {
            entry.cancel.cancel();
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    async fn publish(&self, entry: &JobEntry, update: impl FnOnce(&mut JobStatus)) -> JobStatus {
        entry.status.send_modify(update);
        let snapshot = entry.status.borrow().clone();

        if let Err(e) = db::jobs::save_job(&self.ctx.db, &snapshot, self.ctx.config.db_max_lock_wait_ms).await {
            warn!(job_id = %snapshot.job_id, error = %e, "Failed to persist job status");
        }
        snapshot
    }

    async fn run_job(&self, job_id: Uuid, entry: Arc<JobEntry>, chunks: Vec<Chunk>, plan: JobPlan) {
        let chunks_total = chunks.len();
        self.publish(&entry, |s| s.transition_to(JobState::Running)).await;
        info!(job_id = %job_id, chunks_total, "Job running");

        let semaphore = Arc::new(Semaphore::new(self.ctx.config.worker_count.max(1)));
        let mut pending: BTreeSet<usize> = chunks.iter().map(|c| c.chunk_id).collect();
        let mut set = JoinSet::new();

        for chunk in chunks {
            let orchestrator = self.clone();
            let semaphore = semaphore.clone();
            let cancel = entry.cancel.clone();
            let plan = plan.clone();
            set.spawn(async move { orchestrator.run_chunk(job_id, chunk, plan, semaphore, cancel).await });
        }

        // Fan-in barrier
        let mut reports: Vec<ChunkReport> = Vec::with_capacity(chunks_total);
        while let Some(joined) = set.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Chunk supervisor task failed");
                    continue;
                }
            };
            pending.remove(&report.chunk_id);
            self.record_report(job_id, &entry, &report).await;
            reports.push(report);
        }

        for chunk_id in pending {
            let report = ChunkReport::failed(chunk_id, "chunk task aborted");
            self.record_report(job_id, &entry, &report).await;
            reports.push(report);
        }

        self.finalize_job(job_id, &entry, &reports, &plan).await;
    }

    /// Run one chunk under the worker limit and time limit; never fails
    async fn run_chunk(
        &self,
        job_id: Uuid,
        chunk: Chunk,
        plan: JobPlan,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> ChunkReport {
        let chunk_id = chunk.chunk_id;

        let _permit = tokio::select! {
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return ChunkReport::failed(chunk_id, "worker pool closed"),
            },
            _ = cancel.cancelled() => {
                return ChunkReport::failed(chunk_id, PipelineError::Cancelled(format!("chunk {} not started", chunk_id)).to_string());
            }
        };
        if cancel.is_cancelled() {
            return ChunkReport::failed(
                chunk_id,
                PipelineError::Cancelled(format!("chunk {} not started", chunk_id)).to_string(),
            );
        }

        debug!(job_id = %job_id, chunk_id, size = chunk.work.len(), "Chunk started");

        // Separate task so a panic in the chunk body is contained
        let ctx = self.ctx.clone();
        let body_cancel = cancel.clone();
        let mut handle = tokio::spawn(async move {
            match (&chunk.work, &plan) {
                (ChunkWork::Tokens { ids }, JobPlan::RootExtraction) => {
                    run_extraction_chunk(&ctx, chunk.chunk_id, ids, &body_cancel).await
                }
                (ChunkWork::Verses { start, end }, JobPlan::Tokenization { verses }) => {
                    let range: Vec<VerseText> = verses
                        .iter()
                        .filter(|v| v.verse >= *start && v.verse <= *end)
                        .cloned()
                        .collect();
                    run_tokenization_chunk(&ctx, chunk.chunk_id, &range, &body_cancel).await
                }
                _ => Err(PipelineError::Internal(format!(
                    "chunk {} work does not match its job",
                    chunk.chunk_id
                ))),
            }
        });

        match tokio::time::timeout(self.chunk_timeout, &mut handle).await {
            Ok(Ok(Ok(outcome))) => ChunkReport::succeeded(chunk_id, outcome),
            Ok(Ok(Err(e))) => ChunkReport::failed(chunk_id, e.to_string()),
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    format!("chunk {} panicked", chunk_id)
                } else {
                    format!("chunk {} aborted", chunk_id)
                };
                ChunkReport::failed(chunk_id, message)
            }
            Err(_) => {
                handle.abort();
                ChunkReport::failed(
                    chunk_id,
                    PipelineError::ChunkTimeout {
                        chunk_id,
                        seconds: self.chunk_timeout.as_secs(),
                    }
                    .to_string(),
                )
            }
        }
    }

    async fn record_report(&self, job_id: Uuid, entry: &JobEntry, report: &ChunkReport) {
        let status = self.publish(entry, |s| s.record_chunk()).await;
        let progress = progress_percent(status.chunks_completed, status.chunks_total);

        let event = if report.success {
            info!(
                job_id = %job_id,
                chunk_id = report.chunk_id,
                processed = report.tokens_processed,
                updated = report.tokens_updated,
                progress = %format!("{:.1}%", progress),
                "Chunk completed"
            );
            PipelineEvent::ChunkCompleted {
                job_id,
                chunk_id: report.chunk_id,
                tokens_processed: report.tokens_processed,
                tokens_updated: report.tokens_updated,
                progress_percent: progress,
                timestamp: Utc::now(),
            }
        } else {
            let error = report.error.clone().unwrap_or_default();
            error!(job_id = %job_id, chunk_id = report.chunk_id, error = %error, "Chunk failed");
            PipelineEvent::ChunkFailed {
                job_id,
                chunk_id: report.chunk_id,
                error,
                progress_percent: progress,
                timestamp: Utc::now(),
            }
        };
        self.ctx.event_bus.emit_lossy(event);
    }

    /// Persist the final status, announce it, then release waiters
    ///
    /// A persisted job leaves the in-memory table; one whose final status
    /// could not be written stays so its FAILURE remains visible.
    async fn finalize_job(&self, job_id: Uuid, entry: &JobEntry, reports: &[ChunkReport], plan: &JobPlan) {
        let result: FinalizedJob = finalize(reports);

        if matches!(plan, JobPlan::RootExtraction) {
            if let Err(e) = self.ctx.result_cache.save().await {
                warn!(job_id = %job_id, error = %e, "Failed to save result cache");
            }
        }

        let mut snapshot = entry.status.borrow().clone();
        snapshot.complete(result);

        match db::jobs::save_job(&self.ctx.db, &snapshot, self.ctx.config.db_max_lock_wait_ms).await {
            Ok(()) => {
                info!(
                    job_id = %job_id,
                    processed = result.tokens_processed,
                    updated = result.tokens_updated,
                    succeeded = result.chunks_succeeded,
                    failed = result.chunks_failed,
                    "Job finalized"
                );
                self.ctx.event_bus.emit_lossy(PipelineEvent::JobFinalized {
                    job_id,
                    tokens_processed: result.tokens_processed,
                    tokens_updated: result.tokens_updated,
                    chunks_succeeded: result.chunks_succeeded,
                    chunks_failed: result.chunks_failed,
                    timestamp: Utc::now(),
                });
                // The jobs table now answers status queries for this job
                self.jobs.write().await.remove(&job_id);
            }
            Err(e) => {
                let message = format!("finalize failed: {}", e);
                error!(job_id = %job_id, error = %message, "Job failed");
                snapshot.fail(message.clone());
                self.ctx.event_bus.emit_lossy(PipelineEvent::JobFailed {
                    job_id,
                    error: message,
                    timestamp: Utc::now(),
                });
            }
        }

        entry.status.send_replace(snapshot);
    }
}
