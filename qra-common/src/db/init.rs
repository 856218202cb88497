//! Database initialization
//!
//! Creates the database on first run and applies the (idempotent) schema:
//! `tokens`, `roots` and `jobs`.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection unless overridden
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Open (creating if needed) the database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    init_database_with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
}

/// Same as [`init_database`] with an explicit SQLite busy timeout
pub async fn init_database_with_busy_timeout(
    db_path: &Path,
    busy_timeout_ms: u64,
) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL lets chunk workers write while status queries read
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(busy_timeout_ms))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (safe to call repeatedly)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_tokens_table(pool).await?;
    create_roots_table(pool).await?;
    create_jobs_table(pool).await?;
    Ok(())
}

async fn create_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container INTEGER NOT NULL,
            verse INTEGER NOT NULL,
            position INTEGER NOT NULL,
            text_ar TEXT NOT NULL,
            normalized TEXT NOT NULL,
            root TEXT,
            root_sources TEXT,
            status TEXT NOT NULL DEFAULT 'missing'
                CHECK (status IN ('missing', 'verified', 'discrepancy', 'manual_review')),
            token_references TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (container, verse, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tokens_status ON tokens(container, status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tokens_root ON tokens(root)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_roots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roots (
            root TEXT PRIMARY KEY,
            token_count INTEGER NOT NULL DEFAULT 0,
            tokens TEXT NOT NULL DEFAULT '[]',
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            container INTEGER NOT NULL,
            state TEXT NOT NULL,
            progress_percent REAL NOT NULL DEFAULT 0,
            chunks_total INTEGER NOT NULL DEFAULT 0,
            chunks_completed INTEGER NOT NULL DEFAULT 0,
            result TEXT,
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
