//! Chunk bodies run by the orchestrator's worker pool

use super::ChunkOutcome;
use crate::db::tokens::{self, TokenUpdate};
use crate::error::{PipelineError, PipelineResult};
use crate::tokenizer::{tokenize_verse, VerseText};
use crate::PipelineContext;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run root extraction over the given token ids
///
/// Updates are committed every `commit_batch_size` tokens; batches already
/// committed stay committed if the chunk later fails or is cancelled.
pub(super) async fn run_extraction_chunk(
    ctx: &PipelineContext,
    chunk_id: usize,
    ids: &[i64],
    cancel: &CancellationToken,
) -> PipelineResult<ChunkOutcome> {
    let lock_wait = ctx.config.db_max_lock_wait_ms;
    let batch_size = ctx.config.commit_batch_size.max(1);
    let records = tokens::load_tokens_by_ids(&ctx.db, ids).await?;

    let mut outcome = ChunkOutcome::default();
    let mut pending: Vec<TokenUpdate> = Vec::with_capacity(batch_size);
    let mut since_commit = 0usize;

    for record in &records {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(format!("chunk {} stopped", chunk_id)));
        }

        let location = record.location();
        let assignment = ctx.service.extract(&record.normalized, Some(&location)).await;
        outcome.tokens_processed += 1;
        since_commit += 1;

        match assignment {
            Some(assignment) => {
                let status = ctx.service.status_for(&record.normalized, &assignment);
                debug!(
                    chunk_id,
                    token_id = record.id,
                    %location,
                    root = %assignment.root,
                    method = %assignment.method,
                    status = %status,
                    "Token assigned"
                );
                pending.push(TokenUpdate {
                    id: record.id,
                    root: assignment.root,
                    root_sources: assignment.sources,
                    status,
                });
            }
            None => debug!(chunk_id, token_id = record.id, %location, "Token left missing"),
        }

        if since_commit >= batch_size {
            outcome.tokens_updated += tokens::apply_root_updates(&ctx.db, &pending, lock_wait).await?;
            pending.clear();
            since_commit = 0;
        }
    }

    outcome.tokens_updated += tokens::apply_root_updates(&ctx.db, &pending, lock_wait).await?;
    Ok(outcome)
}

/// Tokenize the given verses and insert their tokens
///
/// Each verse is one transaction. `tokens_updated` counts rows actually
/// inserted, so a re-run reports zero.
pub(super) async fn run_tokenization_chunk(
    ctx: &PipelineContext,
    chunk_id: usize,
    verses: &[VerseText],
    cancel: &CancellationToken,
) -> PipelineResult<ChunkOutcome> {
    let lock_wait = ctx.config.db_max_lock_wait_ms;
    let mut outcome = ChunkOutcome::default();

    for verse in verses {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(format!("chunk {} stopped", chunk_id)));
        }

        let words = tokenize_verse(&verse.text, verse.container, verse.verse);
        outcome.tokens_processed += words.len() as u64;
        outcome.tokens_updated += tokens::insert_tokens(&ctx.db, &words, lock_wait).await?;
    }

    debug!(
        chunk_id,
        verses = verses.len(),
        tokens = outcome.tokens_processed,
        inserted = outcome.tokens_updated,
        "Tokenization chunk done"
    );
    Ok(outcome)
}
