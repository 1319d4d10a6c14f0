//! Message batch replace, ordered retrieval, and the message-content
//! full-text search pass.

use crate::{Database, DbError, DbResult};
use claude_view_core::types::{Message, Role};
use sqlx::Row;

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, sqlx::Error> {
    let tool_mentions_json: Option<String> = row.try_get("tool_mentions")?;
    let tool_mentions = tool_mentions_json.map(|j| serde_json::from_str(&j).unwrap_or_default());
    Ok(Message {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        role: Role::parse(&row.try_get::<String, _>("role")?),
        content: row.try_get("content")?,
        timestamp: row.try_get("timestamp")?,
        sequence: row.try_get::<i64, _>("sequence")? as u32,
        has_code: row.try_get::<i64, _>("has_code")? != 0,
        tool_mentions,
    })
}

impl Database {
    /// Replace all messages belonging to `session_id` with `messages`, in
    /// one transaction — either all land or nothing changes.
    pub async fn upsert_messages(&self, session_id: &str, messages: &[Message]) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        for msg in messages {
            let tool_mentions = msg
                .tool_mentions
                .as_ref()
                .map(|m| serde_json::to_string(m).unwrap_or_else(|_| "[]".into()));
            sqlx::query(
                r#"
                INSERT INTO messages (id, session_id, role, content, timestamp, sequence, has_code, tool_mentions)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&msg.id)
            .bind(session_id)
            .bind(msg.role.as_str())
            .bind(&msg.content)
            .bind(msg.timestamp)
            .bind(msg.sequence as i64)
            .bind(msg.has_code as i64)
            .bind(tool_mentions)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_session_messages(&self, session_id: &str) -> DbResult<Vec<Message>> {
        let rows = sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY sequence ASC")
            .bind(session_id)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub async fn count_messages(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages").fetch_one(self.pool()).await?;
        Ok(row.0)
    }

    /// Message-content full-text search. Returns `(session_id, bm25)`
    /// with lower-is-better polarity, taking the best (minimum) score per
    /// session across all of its matching messages.
    pub async fn search_messages_fts(&self, query: &str, limit: i64) -> DbResult<Vec<(String, f64)>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT m.session_id AS session_id, MIN(bm25(messages_fts)) AS score
            FROM messages_fts
            JOIN messages m ON m.rowid = messages_fts.rowid
            WHERE messages_fts MATCH ?1
            GROUP BY m.session_id
            ORDER BY score
            LIMIT ?2
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter()
            .map(|r| Ok((r.try_get::<String, _>("session_id")?, r.try_get::<f64, _>("score")?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(DbError::from)
    }
}
