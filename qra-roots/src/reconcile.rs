//! Reconciliation pass
//!
//! Re-classifies every token that carries a source map and writes the
//! consensus root and recommended status to tokens still MISSING. Tokens
//! already in a terminal status are counted but left untouched.

use crate::db::tokens::{self, TokenUpdate};
use crate::discrepancy::{DiscrepancyChecker, DiscrepancyStatistics};
use crate::error::PipelineResult;
use qra_common::db::TokenStatus;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub statistics: DiscrepancyStatistics,
    pub tokens_updated: u64,
}

pub async fn reconcile(
    pool: &SqlitePool,
    checker: &DiscrepancyChecker,
    max_wait_ms: u64,
) -> PipelineResult<ReconcileReport> {
    let records = tokens::load_tokens_with_sources(pool).await?;

    let inputs: Vec<(i64, String, TokenStatus, BTreeMap<String, Option<String>>)> = records
        .into_iter()
        .map(|record| {
            let sources = record
                .root_sources
                .unwrap_or_default()
                .into_iter()
                .map(|(source, root)| (source, Some(root)))
                .collect();
            (record.id, record.normalized, record.status, sources)
        })
        .collect();

    let reports = checker.analyze_batch(inputs.iter().map(|(_, word, _, sources)| (word.as_str(), sources)));
    let statistics = DiscrepancyChecker::statistics(&reports);

    let updates: Vec<TokenUpdate> = inputs
        .iter()
        .zip(&reports)
        .filter(|((_, _, status, _), _)| *status == TokenStatus::Missing)
        .filter_map(|((id, _, _, sources), report)| {
            let root = report.consensus_root.clone()?;
            Some(TokenUpdate {
                id: *id,
                root,
                root_sources: sources
                    .iter()
                    .filter_map(|(source, root)| root.clone().map(|r| (source.clone(), r)))
                    .collect(),
                status: report.recommended_status,
            })
        })
        .collect();

    let tokens_updated = tokens::apply_root_updates(pool, &updates, max_wait_ms).await?;

    info!(
        total = statistics.total,
        verified = statistics.verified,
        discrepancy = statistics.discrepancy,
        manual_review = statistics.manual_review,
        missing = statistics.missing,
        tokens_updated,
        "Reconciliation complete"
    );

    Ok(ReconcileReport {
        statistics,
        tokens_updated,
    })
}
