//! Externally-generated summaries. Summaries outlive re-index — a
//! session re-index never touches this table, only an explicit
//! `upsert_summary` call does (from the legacy-cache migration or an
//! external summarizer collaborator).

use crate::{Database, DbResult};
use claude_view_core::types::Summary;

impl Database {
    pub async fn upsert_summary(&self, summary: &Summary) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO summaries (session_id, text, model, content_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_id) DO UPDATE SET
                text = excluded.text,
                model = excluded.model,
                content_hash = excluded.content_hash,
                created_at = excluded.created_at
            "#,
        )
        .bind(&summary.session_id)
        .bind(&summary.text)
        .bind(&summary.model)
        .bind(&summary.content_hash)
        .bind(summary.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_summary(&self, session_id: &str) -> DbResult<Option<Summary>> {
        let row: Option<(String, String, String, String, i64)> = sqlx::query_as(
            "SELECT session_id, text, model, content_hash, created_at FROM summaries WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(session_id, text, model, content_hash, created_at)| Summary {
            session_id,
            text,
            model,
            content_hash,
            created_at,
        }))
    }
}
