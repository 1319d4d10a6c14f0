//! Hybrid lexical + semantic retrieval over the session index: two
//! independent passes, min-max normalized into a shared range, fused by
//! weighted sum.
//!
//! `Search` owns its embedding cache but not the store — it's handed a
//! `claude_view_db::Database` at construction, same explicit-handle shape
//! as the rest of this workspace (no process-global singleton).

mod cache;
mod normalize;
mod types;

pub use types::{SearchConfig, SearchResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use claude_view_core::types::SearchLogEntry;
use claude_view_db::{Database, DbError};
use claude_view_embedder::Embedder;
use thiserror::Error;

use cache::EmbeddingCache;
use normalize::normalize;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

pub type SearchResultOutcome<T> = Result<T, SearchError>;

pub struct Search {
    db: Database,
    embedder: Option<Arc<dyn Embedder>>,
    config: SearchConfig,
    cache: EmbeddingCache,
}

impl Search {
    pub fn new(db: Database, embedder: Option<Arc<dyn Embedder>>, config: SearchConfig) -> Self {
        Self {
            db,
            embedder,
            config,
            cache: EmbeddingCache::new(),
        }
    }

    pub fn with_defaults(db: Database, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self::new(db, embedder, SearchConfig::default())
    }

    /// Drop the in-process embedding cache. The Indexer calls this after
    /// every commit that touches chunks.
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    /// Full hybrid pipeline: lexical + semantic passes, fused, logged.
    pub async fn search(&self, query: &str, limit: usize) -> SearchResultOutcome<Vec<SearchResult>> {
        let started = Instant::now();
        let limit = if limit == 0 { self.config.default_limit } else { limit };

        let lex_norm = self.lexical_pass(query, limit).await?;
        let sem_norm = self.semantic_pass(query, limit).await?;

        let mut results = self.fuse(&lex_norm, &sem_norm);
        results.truncate(limit);

        self.log(query, &results, started).await?;
        Ok(results)
    }

    /// Lexical pass only, reported without fusion (diagnostics/tests).
    pub async fn search_fts_only(&self, query: &str, limit: usize) -> SearchResultOutcome<Vec<SearchResult>> {
        let limit = if limit == 0 { self.config.default_limit } else { limit };
        let lex_norm = self.lexical_pass(query, limit).await?;
        let mut results: Vec<SearchResult> = lex_norm
            .into_iter()
            .map(|(session_id, score)| SearchResult {
                session_id,
                combined_score: score,
                lex_score: Some(score),
                sem_score: None,
            })
            .collect();
        results.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap());
        results.truncate(limit);
        Ok(results)
    }

    /// Semantic pass only, reported without fusion (diagnostics/tests).
    pub async fn search_semantic_only(&self, query: &str, limit: usize) -> SearchResultOutcome<Vec<SearchResult>> {
        let limit = if limit == 0 { self.config.default_limit } else { limit };
        let sem_norm = self.semantic_pass(query, limit).await?;
        let mut results: Vec<SearchResult> = sem_norm
            .into_iter()
            .map(|(session_id, score)| SearchResult {
                session_id,
                combined_score: score,
                lex_score: None,
                sem_score: Some(score),
            })
            .collect();
        results.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap());
        results.truncate(limit);
        Ok(results)
    }

    async fn lexical_pass(&self, query: &str, limit: usize) -> SearchResultOutcome<HashMap<String, f64>> {
        let fetch_limit = (limit * 2) as i64;
        let message_hits = self.db.search_messages_fts(query, fetch_limit).await?;
        let session_hits = self.db.search_sessions_fts(query, fetch_limit).await?;

        let mut best_bm25: HashMap<String, f64> = HashMap::new();
        for (session_id, bm25) in message_hits.into_iter().chain(session_hits) {
            best_bm25
                .entry(session_id)
                .and_modify(|existing| {
                    if bm25 < *existing {
                        *existing = bm25;
                    }
                })
                .or_insert(bm25);
        }

        // bm25() is lower-is-better (often negative); invert sign so larger
        // is better before normalizing.
        let raw: HashMap<String, f64> = best_bm25.into_iter().map(|(id, score)| (id, -score)).collect();
        Ok(normalize(&raw, self.config.normalization_floor))
    }

    async fn semantic_pass(&self, query: &str, limit: usize) -> SearchResultOutcome<HashMap<String, f64>> {
        let Some(embedder) = &self.embedder else {
            return Ok(HashMap::new());
        };
        if !embedder.available() {
            return Ok(HashMap::new());
        }
        let Some(query_vector) = embedder.embed_query(query).await else {
            return Ok(HashMap::new());
        };

        let cosine_floor = self.config.cosine_floor;
        let best_similarity = self
            .cache
            .with_loaded(&self.db, |entries| {
                let mut best: HashMap<String, f64> = HashMap::new();
                for entry in entries {
                    let similarity = cosine_similarity(&query_vector, &entry.vector);
                    if similarity < cosine_floor {
                        continue;
                    }
                    best.entry(entry.session_id.clone())
                        .and_modify(|existing: &mut f64| {
                            if similarity > *existing {
                                *existing = similarity;
                            }
                        })
                        .or_insert(similarity);
                }
                best
            })
            .await?;

        let mut ranked: Vec<(String, f64)> = best_similarity.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        ranked.truncate(limit * 2);

        let raw: HashMap<String, f64> = ranked.into_iter().collect();
        Ok(normalize(&raw, self.config.normalization_floor))
    }

    fn fuse(&self, lex: &HashMap<String, f64>, sem: &HashMap<String, f64>) -> Vec<SearchResult> {
        let mut session_ids: Vec<&String> = lex.keys().chain(sem.keys()).collect();
        session_ids.sort();
        session_ids.dedup();

        let mut results: Vec<SearchResult> = session_ids
            .into_iter()
            .map(|session_id| {
                let lex_score = lex.get(session_id).copied();
                let sem_score = sem.get(session_id).copied();
                let combined_score = match (lex_score, sem_score) {
                    (Some(l), Some(s)) => self.config.lex_weight * l + self.config.sem_weight * s,
                    (Some(l), None) => 0.5 * l,
                    (None, Some(s)) => 0.5 * s,
                    (None, None) => 0.0,
                };
                SearchResult {
                    session_id: session_id.clone(),
                    combined_score,
                    lex_score,
                    sem_score,
                }
            })
            .filter(|r| r.combined_score >= self.config.combined_floor)
            .collect();

        results.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap());
        results
    }

    async fn log(&self, query: &str, results: &[SearchResult], started: Instant) -> SearchResultOutcome<()> {
        let top_session_ids = results.iter().take(10).map(|r| r.session_id.clone()).collect();
        let entry = SearchLogEntry {
            query: query.to_string(),
            result_count: results.len() as u32,
            top_session_ids,
            elapsed_ms: started.elapsed().as_millis() as u64,
            timestamp: now_epoch(),
        };
        self.db.log_search(&entry).await?;
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
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
    use claude_view_core::types::{Chunk, ChunkType, Session};
    use async_trait::async_trait;

    struct StubEmbedder {
        vector: Option<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn available(&self) -> bool {
            self.vector.is_some()
        }

        fn model_name(&self) -> &str {
            "stub-embedding-model"
        }

        async fn embed_texts(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
            texts.iter().map(|_| self.vector.clone()).collect()
        }
    }

    async fn seeded_db() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_session(&Session::new("login", "claude-code")).await.unwrap();
        db.upsert_messages(
            "login",
            &[claude_view_core::types::Message {
                id: "m0".into(),
                session_id: "login".into(),
                role: claude_view_core::types::Role::User,
                content: "please fix the login bug".into(),
                timestamp: None,
                sequence: 0,
                has_code: false,
                tool_mentions: None,
            }],
        )
        .await
        .unwrap();
        db.upsert_chunks(
            "login",
            &[Chunk {
                id: None,
                session_id: "login".into(),
                message_id: Some("m0".into()),
                chunk_index: 0,
                chunk_type: ChunkType::Turn,
                content: "please fix the login bug".into(),
                metadata: serde_json::Value::Null,
                embedding: Some(vec![1.0, 0.0]),
                embedding_model: Some("text-embedding-3-small".into()),
            }],
        )
        .await
        .unwrap();

        db.upsert_session(&Session::new("unrelated", "droid")).await.unwrap();
        db.upsert_messages(
            "unrelated",
            &[claude_view_core::types::Message {
                id: "m1".into(),
                session_id: "unrelated".into(),
                role: claude_view_core::types::Role::User,
                content: "refactor the billing module".into(),
                timestamp: None,
                sequence: 0,
                has_code: false,
                tool_mentions: None,
            }],
        )
        .await
        .unwrap();
        db.upsert_chunks(
            "unrelated",
            &[Chunk {
                id: None,
                session_id: "unrelated".into(),
                message_id: Some("m1".into()),
                chunk_index: 0,
                chunk_type: ChunkType::Turn,
                content: "refactor the billing module".into(),
                metadata: serde_json::Value::Null,
                embedding: Some(vec![0.0, 1.0]),
                embedding_model: Some("text-embedding-3-small".into()),
            }],
        )
        .await
        .unwrap();

        db
    }

    #[tokio::test]
    async fn lexical_only_finds_matching_session() {
        let db = seeded_db().await;
        let search = Search::with_defaults(db, None);
        let results = search.search_fts_only("login", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_id, "login");
        assert!(results[0].sem_score.is_none());
    }

    #[tokio::test]
    async fn semantic_only_ranks_by_cosine_similarity() {
        let db = seeded_db().await;
        let embedder = Arc::new(StubEmbedder {
            vector: Some(vec![1.0, 0.0]),
        });
        let search = Search::with_defaults(db, Some(embedder));
        let results = search.search_semantic_only("login trouble", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_id, "login");
    }

    #[tokio::test]
    async fn hybrid_search_fuses_both_passes() {
        let db = seeded_db().await;
        let embedder = Arc::new(StubEmbedder {
            vector: Some(vec![1.0, 0.0]),
        });
        let search = Search::with_defaults(db, Some(embedder));
        let results = search.search("login", 10).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].session_id, "login");
        assert!(results[0].lex_score.is_some());
        assert!(results[0].sem_score.is_some());
        assert!(results[0].combined_score > 0.5);
    }

    #[tokio::test]
    async fn embedder_unavailable_degrades_to_lexical_only_halved() {
        let db = seeded_db().await;
        let search = Search::with_defaults(db, None);
        let results = search.search("login", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sem_score, None);
        // single-signal branch halves the normalized lexical score
        assert_eq!(results[0].combined_score, 0.5 * results[0].lex_score.unwrap());
    }

    #[tokio::test]
    async fn empty_corpus_returns_empty() {
        let db = Database::new_in_memory().await.unwrap();
        let search = Search::with_defaults(db, None);
        let results = search.search("anything", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_logs_the_query() {
        let db = seeded_db().await;
        let search = Search::with_defaults(db, None);
        search.search("login", 10).await.unwrap();

        let recent = search.db.recent_searches(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].query, "login");
        assert_eq!(recent[0].top_session_ids, vec!["login".to_string()]);
    }

    #[tokio::test]
    async fn invalidate_cache_forces_semantic_pass_to_reload() {
        let db = seeded_db().await;
        let embedder = Arc::new(StubEmbedder {
            vector: Some(vec![0.0, 1.0]),
        });
        let search = Search::with_defaults(db, Some(embedder));

        // Warm the cache with only "unrelated" matching this query vector.
        let first = search.search_semantic_only("billing", 10).await.unwrap();
        assert_eq!(first[0].session_id, "unrelated");

        // New chunk lands in the store but the cache hasn't been told.
        search
            .db
            .upsert_chunks(
                "login",
                &[Chunk {
                    id: None,
                    session_id: "login".into(),
                    message_id: None,
                    chunk_index: 1,
                    chunk_type: ChunkType::Turn,
                    content: "billing tangent".into(),
                    metadata: serde_json::Value::Null,
                    embedding: Some(vec![0.0, 1.0]),
                    embedding_model: Some("text-embedding-3-small".into()),
                }],
            )
            .await
            .unwrap();

        search.invalidate_cache().await;
        let second = search.search_semantic_only("billing", 10).await.unwrap();
        assert_eq!(second.len(), 2);
    }
}
