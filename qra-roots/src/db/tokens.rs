//! Token table operations
//!
//! Writes never delete rows. Inserts are idempotent on
//! `(container, verse, position)` and root updates only touch tokens that
//! are still `missing`, so re-running a chunk cannot double-count.

use crate::tokenizer::WordToken;
use crate::utils::retry_on_lock;
use qra_common::db::{TokenRecord, TokenStatus};
use qra_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// Root assignment to write for one token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUpdate {
    pub id: i64,
    pub root: String,
    pub root_sources: BTreeMap<String, String>,
    pub status: TokenStatus,
}

/// Token counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusCounts {
    pub missing: i64,
    pub verified: i64,
    pub discrepancy: i64,
    pub manual_review: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.missing + self.verified + self.discrepancy + self.manual_review
    }
}

const TOKEN_COLUMNS: &str = "id, container, verse, position, text_ar, normalized, root, \
                             root_sources, status, token_references";

fn token_from_row(row: &SqliteRow) -> Result<TokenRecord> {
    let status: String = row.get("status");
    let root_sources: Option<String> = row.get("root_sources");
    let references: Option<String> = row.get("token_references");

    Ok(TokenRecord {
        id: row.get("id"),
        container: row.get("container"),
        verse: row.get("verse"),
        position: row.get("position"),
        text_ar: row.get("text_ar"),
        normalized: row.get("normalized"),
        root: row.get("root"),
        root_sources: root_sources.map(|s| serde_json::from_str(&s)).transpose()?,
        status: status.parse()?,
        references: references.map(|s| serde_json::from_str(&s)).transpose()?,
    })
}

/// Insert tokens, skipping rows whose natural key already exists
///
/// Returns the number of rows actually inserted. All rows go in one
/// transaction.
pub async fn insert_tokens(pool: &SqlitePool, tokens: &[WordToken], max_wait_ms: u64) -> Result<u64> {
    if tokens.is_empty() {
        return Ok(0);
    }

    retry_on_lock("insert tokens", max_wait_ms, || async {
        let mut tx = pool.begin().await?;
        let mut inserted = 0u64;

        for token in tokens {
            let result = sqlx::query(
                r#"
                INSERT INTO tokens (container, verse, position, text_ar, normalized, status)
                VALUES (?, ?, ?, ?, ?, 'missing')
                ON CONFLICT(container, verse, position) DO NOTHING
                "#,
            )
            .bind(token.container)
            .bind(token.verse)
            .bind(token.position)
            .bind(&token.text_ar)
            .bind(&token.normalized)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    })
    .await
}

/// Ids of a container's tokens still awaiting a root, in (verse, position) order
pub async fn missing_token_ids(pool: &SqlitePool, container: i64) -> Result<Vec<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM tokens
        WHERE container = ? AND status = 'missing'
        ORDER BY verse, position
        "#,
    )
    .bind(container)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Load tokens by id, ordered by (verse, position); unknown ids are skipped
pub async fn load_tokens_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<TokenRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM tokens WHERE id IN ({}) ORDER BY container, verse, position",
        TOKEN_COLUMNS, placeholders
    );

    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(token_from_row).collect()
}

pub async fn load_token(pool: &SqlitePool, id: i64) -> Result<Option<TokenRecord>> {
    let sql = format!("SELECT {} FROM tokens WHERE id = ?", TOKEN_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(token_from_row).transpose()
}

/// All tokens of a container in (verse, position) order
pub async fn load_container_tokens(pool: &SqlitePool, container: i64) -> Result<Vec<TokenRecord>> {
    let sql = format!(
        "SELECT {} FROM tokens WHERE container = ? ORDER BY verse, position",
        TOKEN_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(container).fetch_all(pool).await?;
    rows.iter().map(token_from_row).collect()
}

/// Tokens carrying a source map, for reconciliation
pub async fn load_tokens_with_sources(pool: &SqlitePool) -> Result<Vec<TokenRecord>> {
    let sql = format!(
        "SELECT {} FROM tokens WHERE root_sources IS NOT NULL ORDER BY container, verse, position",
        TOKEN_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(token_from_row).collect()
}

/// `(id, root)` for every token with a non-empty root
pub async fn load_rooted_tokens(pool: &SqlitePool) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query(
        "SELECT id, root FROM tokens WHERE root IS NOT NULL AND root != '' ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<i64, _>("id"), row.get::<String, _>("root")))
        .collect())
}

/// Write root assignments in one transaction
///
/// Only tokens still `missing` are updated; returns the number of rows
/// changed.
pub async fn apply_root_updates(
    pool: &SqlitePool,
    updates: &[TokenUpdate],
    max_wait_ms: u64,
) -> Result<u64> {
    if updates.is_empty() {
        return Ok(0);
    }

    // Serialize before touching the database
    let prepared: Vec<(i64, &str, String, &'static str)> = updates
        .iter()
        .map(|u| {
            serde_json::to_string(&u.root_sources)
                .map(|sources| (u.id, u.root.as_str(), sources, u.status.as_str()))
                .map_err(Error::from)
        })
        .collect::<Result<_>>()?;

    retry_on_lock("commit token batch", max_wait_ms, || async {
        let mut tx = pool.begin().await?;
        let mut updated = 0u64;

        for (id, root, sources, status) in &prepared {
            let result = sqlx::query(
                r#"
                UPDATE tokens
                SET root = ?, root_sources = ?, status = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ? AND status = 'missing'
                "#,
            )
            .bind(*root)
            .bind(sources)
            .bind(*status)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    })
    .await
}

/// Write cross-reference lists in one transaction; returns rows changed
pub async fn write_references(
    pool: &SqlitePool,
    references: &BTreeMap<i64, Vec<i64>>,
    max_wait_ms: u64,
) -> Result<u64> {
    if references.is_empty() {
        return Ok(0);
    }

    let prepared: Vec<(i64, String)> = references
        .iter()
        .map(|(id, refs)| serde_json::to_string(refs).map(|json| (*id, json)))
        .collect::<std::result::Result<_, _>>()?;

    retry_on_lock("write token references", max_wait_ms, || async {
        let mut tx = pool.begin().await?;
        let mut updated = 0u64;

        for (id, json) in &prepared {
            let result = sqlx::query(
                "UPDATE tokens SET token_references = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            )
            .bind(json)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        Ok(updated)
    })
    .await
}

/// Per-status counts, optionally for one container
pub async fn count_by_status(pool: &SqlitePool, container: Option<i64>) -> Result<StatusCounts> {
    let rows = match container {
        Some(container) => {
            sqlx::query("SELECT status, COUNT(*) AS n FROM tokens WHERE container = ? GROUP BY status")
                .bind(container)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query("SELECT status, COUNT(*) AS n FROM tokens GROUP BY status")
                .fetch_all(pool)
                .await?
        }
    };

    let mut counts = StatusCounts::default();
    for row in rows {
        let status: String = row.get("status");
        let n: i64 = row.get("n");
        match status.parse::<TokenStatus>()? {
            TokenStatus::Missing => counts.missing = n,
            TokenStatus::Verified => counts.verified = n,
            TokenStatus::Discrepancy => counts.discrepancy = n,
            TokenStatus::ManualReview => counts.manual_review = n,
        }
    }
    Ok(counts)
}
