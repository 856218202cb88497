//! Root index table operations

use crate::utils::retry_on_lock;
use qra_common::db::RootEntry;
use qra_common::Result;
use sqlx::{Row, SqlitePool};

/// Insert or replace root entries in one transaction
pub async fn upsert_roots(pool: &SqlitePool, entries: &[RootEntry], max_wait_ms: u64) -> Result<u64> {
    if entries.is_empty() {
        return Ok(0);
    }

    let prepared: Vec<(&str, i64, String)> = entries
        .iter()
        .map(|e| serde_json::to_string(&e.tokens).map(|json| (e.root.as_str(), e.token_count, json)))
        .collect::<std::result::Result<_, _>>()?;

    retry_on_lock("upsert roots", max_wait_ms, || async {
        let mut tx = pool.begin().await?;
        let mut written = 0u64;

        for (root, token_count, tokens) in &prepared {
            let result = sqlx::query(
                r#"
                INSERT INTO roots (root, token_count, tokens, updated_at)
                VALUES (?, ?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(root) DO UPDATE SET
                    token_count = excluded.token_count,
                    tokens = excluded.tokens,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(*root)
            .bind(*token_count)
            .bind(tokens)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    })
    .await
}

pub async fn load_root(pool: &SqlitePool, root: &str) -> Result<Option<RootEntry>> {
    let row = sqlx::query("SELECT root, token_count, tokens FROM roots WHERE root = ?")
        .bind(root)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let tokens: String = row.get("tokens");
            Ok(Some(RootEntry {
                root: row.get("root"),
                token_count: row.get("token_count"),
                tokens: serde_json::from_str(&tokens)?,
            }))
        }
        None => Ok(None),
    }
}

pub async fn count_roots(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roots")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
