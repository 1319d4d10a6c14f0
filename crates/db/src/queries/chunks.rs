//! Chunk batch replace and the embedding-blob scan Search loads into its
//! in-process cache.

use crate::{Database, DbResult};
use claude_view_core::types::{Chunk, ChunkType};

/// One row of `get_all_chunk_embeddings`: a chunk that has a non-null
/// embedding, ready for Search's cosine-similarity pass.
#[derive(Debug, Clone)]
pub struct ChunkEmbeddingRow {
    pub session_id: String,
    pub chunk_id: i64,
    pub embedding: Vec<u8>,
}

impl Database {
    /// Replace all chunks belonging to `session_id`, transactionally, same
    /// atomicity guarantee as `upsert_messages`.
    pub async fn upsert_chunks(&self, session_id: &str, chunks: &[Chunk]) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM chunks WHERE session_id = ?1")
            .bind(session_id)
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
            .bind(session_id)
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

    pub async fn get_session_chunks(&self, session_id: &str) -> DbResult<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT id, session_id, message_id, chunk_index, chunk_type, content, metadata, embedding, embedding_model \
             FROM chunks WHERE session_id = ?1 ORDER BY chunk_index ASC",
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(ChunkRow::into_chunk).collect())
    }

    pub async fn count_chunks(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks").fetch_one(self.pool()).await?;
        Ok(row.0)
    }

    pub async fn count_chunks_with_embeddings(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks WHERE embedding IS NOT NULL")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }

    /// Every chunk with a non-null embedding, for Search's in-process
    /// cache load. Not a true streaming cursor (sqlx's sqlite driver
    /// doesn't expose one cheaply across an owned pool) — materialized as
    /// a `Vec`, which is what the single process-lifetime cache wants
    /// anyway.
    pub async fn get_all_chunk_embeddings(&self) -> DbResult<Vec<ChunkEmbeddingRow>> {
        let rows: Vec<(String, i64, Vec<u8>)> = sqlx::query_as(
            "SELECT session_id, id, embedding FROM chunks WHERE embedding IS NOT NULL",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(session_id, chunk_id, embedding)| ChunkEmbeddingRow {
                session_id,
                chunk_id,
                embedding,
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: i64,
    session_id: String,
    message_id: Option<String>,
    chunk_index: i64,
    chunk_type: String,
    content: String,
    metadata: String,
    embedding: Option<Vec<u8>>,
    embedding_model: Option<String>,
}

impl ChunkRow {
    fn into_chunk(self) -> Chunk {
        let chunk_type = match self.chunk_type.as_str() {
            "summary" => ChunkType::Summary,
            "tool_usage" => ChunkType::ToolUsage,
            _ => ChunkType::Turn,
        };
        Chunk {
            id: Some(self.id),
            session_id: self.session_id,
            message_id: self.message_id,
            chunk_index: self.chunk_index as u32,
            chunk_type,
            content: self.content,
            metadata: serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null),
            embedding: self.embedding.map(|b| claude_view_embedder::deserialize_embedding(&b)),
            embedding_model: self.embedding_model,
        }
    }
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
