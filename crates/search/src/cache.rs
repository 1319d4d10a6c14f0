//! In-process cache of chunk embeddings, loaded lazily and invalidated
//! explicitly after writes.

use claude_view_db::Database;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub(crate) struct CachedEmbedding {
    pub session_id: String,
    pub vector: Vec<f32>,
}

/// Holds `None` until the first semantic query, then a materialized
/// snapshot of every chunk with a non-null embedding.
pub(crate) struct EmbeddingCache {
    entries: RwLock<Option<Vec<CachedEmbedding>>>,
}

impl EmbeddingCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(None),
        }
    }

    /// Drop the cached snapshot; the next semantic query reloads it. Called
    /// by the Indexer after a commit touches chunks.
    pub(crate) async fn invalidate(&self) {
        *self.entries.write().await = None;
    }

    /// Borrow the cache, loading it from `db` first if empty.
    pub(crate) async fn with_loaded<T>(
        &self,
        db: &Database,
        f: impl FnOnce(&[CachedEmbedding]) -> T,
    ) -> claude_view_db::DbResult<T> {
        {
            let guard = self.entries.read().await;
            if let Some(entries) = guard.as_ref() {
                return Ok(f(entries));
            }
        }

        let rows = db.get_all_chunk_embeddings().await?;
        let loaded: Vec<CachedEmbedding> = rows
            .into_iter()
            .map(|row| CachedEmbedding {
                session_id: row.session_id,
                vector: claude_view_embedder::deserialize_embedding(&row.embedding),
            })
            .collect();

        let mut guard = self.entries.write().await;
        let result = f(&loaded);
        *guard = Some(loaded);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_view_core::types::{Chunk, ChunkType, Session};

    #[tokio::test]
    async fn loads_once_and_invalidate_forces_reload() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_session(&Session::new("s1", "claude-code")).await.unwrap();
        db.upsert_chunks(
            "s1",
            &[Chunk {
                id: None,
                session_id: "s1".into(),
                message_id: None,
                chunk_index: 0,
                chunk_type: ChunkType::Turn,
                content: "hello".into(),
                metadata: serde_json::Value::Null,
                embedding: Some(vec![1.0, 0.0]),
                embedding_model: Some("text-embedding-3-small".into()),
            }],
        )
        .await
        .unwrap();

        let cache = EmbeddingCache::new();
        let count = cache.with_loaded(&db, |entries| entries.len()).await.unwrap();
        assert_eq!(count, 1);

        // Write another chunk directly without invalidating: cache is stale.
        db.upsert_chunks(
            "s1",
            &[
                Chunk {
                    id: None,
                    session_id: "s1".into(),
                    message_id: None,
                    chunk_index: 0,
                    chunk_type: ChunkType::Turn,
                    content: "hello".into(),
                    metadata: serde_json::Value::Null,
                    embedding: Some(vec![1.0, 0.0]),
                    embedding_model: Some("text-embedding-3-small".into()),
                },
                Chunk {
                    id: None,
                    session_id: "s1".into(),
                    message_id: None,
                    chunk_index: 1,
                    chunk_type: ChunkType::Turn,
                    content: "world".into(),
                    metadata: serde_json::Value::Null,
                    embedding: Some(vec![0.0, 1.0]),
                    embedding_model: Some("text-embedding-3-small".into()),
                },
            ],
        )
        .await
        .unwrap();

        let stale_count = cache.with_loaded(&db, |entries| entries.len()).await.unwrap();
        assert_eq!(stale_count, 1, "cache should still serve the stale snapshot");

        cache.invalidate().await;
        let fresh_count = cache.with_loaded(&db, |entries| entries.len()).await.unwrap();
        assert_eq!(fresh_count, 2);
    }
}
