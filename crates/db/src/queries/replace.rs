//! Whole-session atomic replace: session row + messages + chunks committed
//! as one transaction, so readers always observe either the pre- or
//! post-reindex state of a given session, never a mix. `upsert_session`/
//! `upsert_messages`/`upsert_chunks` remain available individually
//! (metadata-only indexing uses just the session upsert), but a full
//! re-index goes through here so a reader can never land between the
//! three.

use crate::{Database, DbResult};
use claude_view_core::types::{Chunk, Message, Session};

impl Database {
    /// Replace a session's row, its full message set, and its full chunk
    /// set in one transaction. Either all three land or none do.
    pub async fn replace_session(
        &self,
        session: &Session,
        messages: &[Message],
        chunks: &[Chunk],
    ) -> DbResult<()> {
        let auto_tags = serde_json::to_string(&session.auto_tags).unwrap_or_else(|_| "[]".into());
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, harness, project_path, project_name, title,
                first_prompt, last_prompt, last_response,
                created_time, modified_time, is_child, child_type, parent_id,
                message_count, turn_count, first_prompt_preview,
                raw_path, file_mtime, indexed_at, auto_tags
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16,
                ?17, ?18, ?19, ?20
            )
            ON CONFLICT(id) DO UPDATE SET
                harness = excluded.harness,
                project_path = excluded.project_path,
                project_name = excluded.project_name,
                title = excluded.title,
                first_prompt = excluded.first_prompt,
                last_prompt = excluded.last_prompt,
                last_response = excluded.last_response,
                created_time = excluded.created_time,
                modified_time = excluded.modified_time,
                is_child = excluded.is_child,
                child_type = excluded.child_type,
                parent_id = excluded.parent_id,
                message_count = excluded.message_count,
                turn_count = excluded.turn_count,
                first_prompt_preview = excluded.first_prompt_preview,
                raw_path = excluded.raw_path,
                file_mtime = excluded.file_mtime,
                indexed_at = excluded.indexed_at,
                auto_tags = excluded.auto_tags
            "#,
        )
        .bind(&session.id)
        .bind(&session.harness)
        .bind(&session.project_path)
        .bind(&session.project_name)
        .bind(&session.title)
        .bind(&session.first_prompt)
        .bind(&session.last_prompt)
        .bind(&session.last_response)
        .bind(session.created_time)
        .bind(session.modified_time)
        .bind(session.is_child as i64)
        .bind(&session.child_type)
        .bind(&session.parent_id)
        .bind(session.message_count as i64)
        .bind(session.turn_count as i64)
        .bind(&session.first_prompt_preview)
        .bind(&session.raw_path)
        .bind(session.file_mtime)
        .bind(session.indexed_at)
        .bind(auto_tags)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?1")
            .bind(&session.id)
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
            .bind(&session.id)
            .bind(msg.role.as_str())
            .bind(&msg.content)
            .bind(msg.timestamp)
            .bind(msg.sequence as i64)
            .bind(msg.has_code as i64)
            .bind(tool_mentions)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM chunks WHERE session_id = ?1")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;
        let now = now_epoch();
        for chunk in chunks {
            let metadata = serde_json::to_string(&chunk.metadata).unwrap_or_else(|_| "{}".into());
            let embedding_blob = chunk
                .embedding
                .as_ref()
                .map(|v| claude_view_embedder::serialize_embedding(v));
            sqlx::query(
                r#"
                INSERT INTO chunks (
                    session_id, message_id, chunk_index, chunk_type,
                    content, metadata, embedding, embedding_model, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&session.id)
            .bind(&chunk.message_id)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.chunk_type.as_str())
            .bind(&chunk.content)
            .bind(metadata)
            .bind(embedding_blob)
            .bind(&chunk.embedding_model)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_view_core::types::{ChunkType, Role};

    fn session(id: &str) -> Session {
        let mut s = Session::new(id, "claude-code");
        s.project_path = "/home/dev/widget".into();
        s.project_name = "widget".into();
        s
    }

    fn message(session_id: &str, content: &str, seq: u32) -> Message {
        Message {
            id: format!("{session_id}_{seq}"),
            session_id: session_id.to_string(),
            role: Role::User,
            content: content.to_string(),
            timestamp: None,
            sequence: seq,
            has_code: false,
            tool_mentions: None,
        }
    }

    fn chunk(session_id: &str, index: u32) -> Chunk {
        Chunk {
            id: None,
            session_id: session_id.to_string(),
            message_id: None,
            chunk_index: index,
            chunk_type: ChunkType::Summary,
            content: "summary".into(),
            metadata: serde_json::Value::Null,
            embedding: None,
            embedding_model: None,
        }
    }

    #[tokio::test]
    async fn replace_session_commits_all_three_tables_together() {
        let db = Database::new_in_memory().await.unwrap();
        let s = session("s1");
        let messages = vec![message("s1", "hello", 0)];
        let chunks = vec![chunk("s1", 0)];

        db.replace_session(&s, &messages, &chunks).await.unwrap();

        assert!(db.get_session("s1").await.unwrap().is_some());
        assert_eq!(db.get_session_messages("s1").await.unwrap().len(), 1);
        assert_eq!(db.get_session_chunks("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_session_wholesale_replaces_on_second_call() {
        let db = Database::new_in_memory().await.unwrap();
        let s = session("s1");
        db.replace_session(&s, &[message("s1", "first", 0)], &[chunk("s1", 0)])
            .await
            .unwrap();
        db.replace_session(
            &s,
            &[message("s1", "second", 0), message("s1", "third", 1)],
            &[chunk("s1", 0)],
        )
        .await
        .unwrap();

        let messages = db.get_session_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "second");
    }
}
