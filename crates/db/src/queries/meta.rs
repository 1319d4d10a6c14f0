//! Small key/value table for indexer bookkeeping — last full-reindex
//! timestamp, schema notes, anything that doesn't warrant its own column.

use crate::{Database, DbResult};

impl Database {
    pub async fn get_meta(&self, key: &str) -> DbResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM index_meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO index_meta (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Epoch seconds of the last successful full reindex, if one has run.
    pub async fn last_full_reindex_at(&self) -> DbResult<Option<i64>> {
        Ok(self.get_meta("last_full_reindex_at").await?.and_then(|v| v.parse().ok()))
    }

    pub async fn set_last_full_reindex_at(&self, timestamp: i64) -> DbResult<()> {
        self.set_meta("last_full_reindex_at", &timestamp.to_string()).await
    }
}
