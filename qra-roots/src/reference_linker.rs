//! Cross-references between tokens sharing a root
//!
//! 1. [`build_root_index`]: root to sorted token ids
//! 2. [`build_token_references`]: token id to every other token with its root
//! 3. [`compress_references`]: cap each list with an evenly strided sample
//!
//! [`persist`] writes the result to `tokens.token_references` and the
//! `roots` table.

use crate::db;
use crate::error::PipelineResult;
use qra_common::db::RootEntry;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;

pub const DEFAULT_MAX_REFERENCES: usize = 100;

pub type RootIndex = BTreeMap<String, Vec<i64>>;
pub type TokenReferences = BTreeMap<i64, Vec<i64>>;

/// Group token ids by root; tokens with an empty root are skipped
pub fn build_root_index<'a, I>(tokens: I) -> RootIndex
where
    I: IntoIterator<Item = (i64, &'a str)>,
{
    let mut index = RootIndex::new();
    for (id, root) in tokens {
        if !root.is_empty() {
            index.entry(root.to_string()).or_default().push(id);
        }
    }
    for ids in index.values_mut() {
        ids.sort_unstable();
        ids.dedup();
    }
    index
}

/// Every token maps to the other tokens sharing its root (never itself)
pub fn build_token_references(index: &RootIndex) -> TokenReferences {
    let mut references = TokenReferences::new();
    for ids in index.values() {
        for &id in ids {
            references.insert(id, ids.iter().copied().filter(|other| *other != id).collect());
        }
    }
    references
}

/// Evenly strided sample of at most `max` elements
///
/// Keeps the first and last elements whenever `max >= 2`.
pub fn sample_evenly(items: &[i64], max: usize) -> Vec<i64> {
    let n = items.len();
    if n <= max {
        return items.to_vec();
    }
    match max {
        0 => Vec::new(),
        1 => vec![items[0]],
        _ => (0..max).map(|i| items[i * (n - 1) / (max - 1)]).collect(),
    }
}

pub fn compress_references(references: &TokenReferences, max: usize) -> TokenReferences {
    references
        .iter()
        .map(|(id, refs)| (*id, sample_evenly(refs, max)))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total_roots: usize,
    pub total_tokens: usize,
    pub avg_tokens_per_root: f64,
    pub max_tokens_per_root: usize,
    pub min_tokens_per_root: usize,
}

pub fn statistics(index: &RootIndex) -> IndexStatistics {
    if index.is_empty() {
        return IndexStatistics::default();
    }

    let counts = index.values().map(Vec::len);
    let total_tokens: usize = counts.clone().sum();
    IndexStatistics {
        total_roots: index.len(),
        total_tokens,
        avg_tokens_per_root: total_tokens as f64 / index.len() as f64,
        max_tokens_per_root: counts.clone().max().unwrap_or(0),
        min_tokens_per_root: counts.min().unwrap_or(0),
    }
}

/// Outcome of a linking pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    pub statistics: IndexStatistics,
    pub tokens_linked: u64,
    pub roots_written: u64,
}

/// Build references for every rooted token and write them back
pub async fn persist(pool: &SqlitePool, max_references: usize, max_wait_ms: u64) -> PipelineResult<LinkReport> {
    let rooted = db::tokens::load_rooted_tokens(pool).await?;
    let index = build_root_index(rooted.iter().map(|(id, root)| (*id, root.as_str())));
    let stats = statistics(&index);

    let references = compress_references(&build_token_references(&index), max_references);
    let tokens_linked = db::tokens::write_references(pool, &references, max_wait_ms).await?;

    let entries: Vec<RootEntry> = index
        .iter()
        .map(|(root, ids)| RootEntry {
            root: root.clone(),
            token_count: ids.len() as i64,
            tokens: ids.clone(),
        })
        .collect();
    let roots_written = db::roots::upsert_roots(pool, &entries, max_wait_ms).await?;

    info!(
        roots = stats.total_roots,
        tokens = stats.total_tokens,
        tokens_linked,
        "Reference index written"
    );

    Ok(LinkReport {
        statistics: stats,
        tokens_linked,
        roots_written,
    })
}
