//! Embedded relational store for the session index: schema migrations,
//! full-text search over messages and session metadata, chunk
//! embeddings, and the transactional upsert/delete paths the indexer
//! drives.
//!
//! Backed by a single SQLite file opened through `sqlx::SqlitePool` in
//! WAL mode with foreign keys enforced — one writer, many readers, never
//! blocking each other for bounded queries.

mod migrations;
pub mod queries;

pub use queries::chunks::ChunkEmbeddingRow;
pub use queries::sessions::SessionFilter;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to determine cache directory")]
    NoCacheDir,

    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),

    #[error("integrity violation: {0}")]
    Integrity(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment variable overriding the default database path (test/dev
/// convenience).
pub const DB_PATH_ENV_VAR: &str = "AGENT_INDEX_DB_PATH";

/// Max attempts when retrying a write that hit `SQLITE_BUSY`.
const BUSY_RETRY_ATTEMPTS: u32 = 5;

/// The session-index database handle.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30))
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;
        info!(path = %path.display(), "session index database opened");
        Ok(db)
    }

    /// In-memory database for tests. `shared_cache(true)` so every pool
    /// connection sees the same in-memory database.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open the database at the default location, or `AGENT_INDEX_DB_PATH`
    /// if set.
    pub async fn open_default() -> DbResult<Self> {
        let path = match std::env::var(DB_PATH_ENV_VAR) {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => claude_view_core::paths::db_path().ok_or(DbError::NoCacheDir)?,
        };
        Self::new(&path).await
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run any migrations not yet recorded in `schema_meta`. Schema
    /// migration failure is fatal — no silent downgrade.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_meta")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1;
            if version <= current_version {
                continue;
            }
            sqlx::raw_sql(migration).execute(&self.pool).await?;
            sqlx::query("INSERT INTO schema_meta (version) VALUES (?)")
                .bind(version as i64)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Retry a write a bounded number of times on `SQLITE_BUSY` /
    /// `SQLITE_LOCKED`, with exponential backoff.
    pub(crate) async fn with_busy_retry<T, F, Fut>(&self, mut op: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(sqlx::Error::Database(db_err))
                    if is_busy(db_err.message()) && attempt < BUSY_RETRY_ATTEMPTS =>
                {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(50 * 2u64.pow(attempt))).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_busy(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("database is locked") || lower.contains("busy")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_runs_migrations() {
        let db = Database::new_in_memory().await.expect("open");
        let count = db.count_sessions().await.expect("count");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent_across_reopen_of_same_pool() {
        let db = Database::new_in_memory().await.expect("open");
        // Running migrations again against the same handle must not error.
        db.run_migrations().await.expect("re-run migrations");
    }
}
