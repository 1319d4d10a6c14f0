//! Scan -> parse -> chunk -> tag -> embed -> commit pipeline, driven by a
//! `Vec<Box<dyn Provider>>` instead of one hardcoded filesystem walk.
//!
//! Full and incremental reindex share one per-session state machine
//! (`session::process_session`); the two modes differ only in which
//! session ids get fed into it.

mod legacy_summary;
mod related;
mod session;

pub use legacy_summary::migrate_legacy_summaries;
pub use related::DEFAULT_ORPHAN_WINDOW;
pub use session::SessionOutcome;

use std::sync::Arc;
use std::time::Instant;

use claude_view_core::provider::Provider;
use claude_view_db::{Database, DbError};
use claude_view_embedder::Embedder;
use claude_view_search::Search;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

pub type IndexerResult<T> = Result<T, IndexerError>;

/// `(sessions_done, sessions_total, current_session_id)`, called once per
/// session regardless of whether it indexed or was skipped.
pub type ProgressFn<'a> = dyn Fn(usize, usize, &str) + Send + Sync + 'a;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub sessions_indexed: u32,
    pub messages_indexed: u32,
    pub chunks_created: u32,
    pub time_ms: u64,
}

/// Options for `reindex_incremental`.
#[derive(Debug, Clone, Default)]
pub struct IncrementalOptions {
    /// Only consider sessions with mtime >= now - max_age_hours. Providers
    /// without `fast_discovery` are skipped entirely when this is set.
    pub max_age_hours: Option<u64>,
    /// Upsert Session rows only; skip messages/chunks/tags/embeddings.
    pub metadata_only: bool,
}

pub struct Indexer {
    db: Database,
    search: Arc<Search>,
    providers: Vec<Box<dyn Provider>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Indexer {
    pub fn new(
        db: Database,
        search: Arc<Search>,
        providers: Vec<Box<dyn Provider>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self { db, search, providers, embedder }
    }

    /// Enumerate every session every available provider currently reports,
    /// replacing any existing rows, then recompute stats for every project
    /// touched.
    pub async fn reindex_full(
        &self,
        progress: Option<&ProgressFn<'_>>,
        cancel: CancellationToken,
    ) -> IndexerResult<Stats> {
        let started = Instant::now();
        let mut stats = Stats::default();
        let mut touched_projects = std::collections::HashSet::new();

        let mut work = Vec::new();
        for provider in &self.providers {
            if !provider.is_available() {
                continue;
            }
            match provider.discover().await {
                Ok(discovered) => {
                    for d in discovered {
                        work.push((provider.as_ref(), d.session_id));
                    }
                }
                Err(e) => warn!(provider = provider.name(), error = %e, "discovery failed, skipping provider"),
            }
        }

        let total = work.len();
        for (i, (provider, session_id)) in work.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let outcome =
                session::process_session(&self.db, provider, &session_id, false, self.embedder.as_ref()).await;
            self.apply_outcome(&outcome, &mut stats, &mut touched_projects).await;
            if let Some(cb) = progress {
                cb(i + 1, total, &session_id);
            }
        }

        self.recompute_touched_projects(&touched_projects).await;
        self.db.set_last_full_reindex_at(now_epoch()).await?;
        stats.time_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Index only sessions that are new or whose mtime has advanced past
    /// what's already stored.
    pub async fn reindex_incremental(
        &self,
        options: IncrementalOptions,
        progress: Option<&ProgressFn<'_>>,
        cancel: CancellationToken,
    ) -> IndexerResult<Stats> {
        let started = Instant::now();
        let mut stats = Stats::default();
        let mut touched_projects = std::collections::HashSet::new();

        // Single batched load of every session's (mtime via file_mtime, indexed_at)
        // so the per-provider diff below never round-trips the Store per id.
        let known = self.load_known_mtimes().await?;
        let cutoff = options.max_age_hours.map(|hrs| now_epoch() - (hrs as i64) * 3600);

        let mut work = Vec::new();
        for provider in &self.providers {
            if !provider.is_available() {
                continue;
            }
            if cutoff.is_some() && !provider.fast_discovery() {
                continue;
            }
            let discovered = match provider.discover().await {
                Ok(d) => d,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "discovery failed, skipping provider");
                    continue;
                }
            };
            for d in discovered {
                let should_index = match known.get(&d.session_id) {
                    None => cutoff.is_none_or(|c| d.mtime >= c),
                    Some((_, indexed_at)) => d.mtime > indexed_at.unwrap_or(0),
                };
                if should_index {
                    work.push((provider.as_ref(), d.session_id));
                }
            }
        }

        let total = work.len();
        for (i, (provider, session_id)) in work.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = session::process_session(
                &self.db,
                provider,
                &session_id,
                options.metadata_only,
                self.embedder.as_ref(),
            )
            .await;
            self.apply_outcome(&outcome, &mut stats, &mut touched_projects).await;
            if let Some(cb) = progress {
                cb(i + 1, total, &session_id);
            }
        }

        self.recompute_touched_projects(&touched_projects).await;
        stats.time_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Heuristic match of orphaned children to `parent`: same project path,
    /// same harness, discovered within the temporal window (widened for
    /// providers flagged `long_running_child_window`). This is deliberately
    /// a read-time join, not something baked into a session's stored
    /// parent_id.
    pub async fn get_related_children(
        &self,
        parent: &claude_view_core::types::Session,
    ) -> IndexerResult<Vec<claude_view_core::types::Session>> {
        let window = self
            .providers
            .iter()
            .find(|p| p.name() == parent.harness)
            .and_then(|p| p.long_running_child_window())
            .unwrap_or(DEFAULT_ORPHAN_WINDOW);

        let linked = self.db.get_children(&parent.id).await?;
        let orphans = self.db.get_orphan_candidates(&parent.project_path, &parent.harness).await?;
        Ok(related::merge_children(parent, linked, orphans, window))
    }

    async fn load_known_mtimes(&self) -> IndexerResult<std::collections::HashMap<String, (Option<i64>, Option<i64>)>> {
        let sessions = self
            .db
            .get_sessions(&claude_view_db::SessionFilter::default(), i64::MAX, 0)
            .await?;
        Ok(sessions
            .into_iter()
            .map(|s| (s.id, (s.file_mtime, s.indexed_at)))
            .collect())
    }

    async fn apply_outcome(
        &self,
        outcome: &SessionOutcome,
        stats: &mut Stats,
        touched_projects: &mut std::collections::HashSet<String>,
    ) {
        match outcome {
            SessionOutcome::Committed { project_path, message_count, chunk_count, .. } => {
                stats.sessions_indexed += 1;
                stats.messages_indexed += message_count;
                stats.chunks_created += chunk_count;
                touched_projects.insert(project_path.clone());
                self.search.invalidate_cache().await;
            }
            SessionOutcome::Skipped { session_id, reason } => {
                warn!(%session_id, %reason, "session skipped during indexing");
            }
        }
    }

    async fn recompute_touched_projects(&self, projects: &std::collections::HashSet<String>) {
        for project_path in projects {
            if let Err(e) = self.db.recompute_project_stats(project_path).await {
                warn!(%project_path, error = %e, "failed to recompute project stats");
            }
        }
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
    use async_trait::async_trait;
    use claude_view_core::error::{DiscoveryError, ParseError};
    use claude_view_core::provider::{DiscoveredSession, MessageStream};
    use claude_view_core::types::{Message, Role, Session};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        sessions: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }
        fn display_name(&self) -> &str {
            "Fake"
        }
        fn sessions_root(&self) -> Option<PathBuf> {
            Some(PathBuf::from("/fake"))
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn discover(&self) -> Result<Vec<DiscoveredSession>, DiscoveryError> {
            Ok(self
                .sessions
                .iter()
                .map(|(id, _)| DiscoveredSession { session_id: id.to_string(), mtime: 1_700_000_000 })
                .collect())
        }
        async fn parse_metadata(&self, session_id: &str) -> Result<Option<Session>, ParseError> {
            let Some((_, prompt)) = self.sessions.iter().find(|(id, _)| *id == session_id) else {
                return Ok(None);
            };
            let mut session = Session::new(session_id, "fake");
            session.project_path = "/home/dev/demo".into();
            session.project_name = "demo".into();
            session.first_prompt = prompt.to_string();
            session.last_prompt = prompt.to_string();
            session.file_mtime = Some(1_700_000_000);
            Ok(Some(session))
        }
        async fn iter_messages<'a>(&'a self, session_id: &'a str) -> MessageStream<'a> {
            let Some((_, prompt)) = self.sessions.iter().find(|(id, _)| *id == session_id) else {
                return Box::pin(tokio_stream::empty());
            };
            let msg = Message {
                id: format!("{session_id}_0"),
                session_id: session_id.to_string(),
                role: Role::User,
                content: prompt.to_string(),
                timestamp: None,
                sequence: 0,
                has_code: false,
                tool_mentions: None,
            };
            Box::pin(tokio_stream::once(Ok(msg)))
        }
    }

    async fn fresh_indexer(sessions: Vec<(&'static str, &'static str)>) -> (Indexer, Arc<Search>) {
        let db = Database::new_in_memory().await.unwrap();
        let search = Arc::new(Search::with_defaults(db.clone(), None));
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(FakeProvider { sessions })];
        let indexer = Indexer::new(db, search.clone(), providers, None);
        (indexer, search)
    }

    #[tokio::test]
    async fn reindex_full_indexes_every_discovered_session() {
        let (indexer, _search) = fresh_indexer(vec![("s1", "fix the login bug"), ("s2", "add a test")]).await;
        let stats = indexer.reindex_full(None, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.sessions_indexed, 2);
        assert_eq!(stats.messages_indexed, 2);
        assert!(stats.chunks_created >= 2);
    }

    #[tokio::test]
    async fn reindex_full_reports_progress_per_session() {
        let (indexer, _search) = fresh_indexer(vec![("s1", "one"), ("s2", "two")]).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let cb = move |_done: usize, _total: usize, _id: &str| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        };
        indexer.reindex_full(Some(&cb), CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reindex_incremental_is_idempotent_until_mtime_changes() {
        let (indexer, _search) = fresh_indexer(vec![("s1", "fix the login bug")]).await;
        let first = indexer
            .reindex_incremental(IncrementalOptions::default(), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.sessions_indexed, 1);

        let second = indexer
            .reindex_incremental(IncrementalOptions::default(), None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.sessions_indexed, 0);
    }

    #[tokio::test]
    async fn metadata_only_mode_skips_messages_and_chunks() {
        let (indexer, _search) = fresh_indexer(vec![("s1", "fix the login bug")]).await;
        let options = IncrementalOptions { metadata_only: true, ..Default::default() };
        let stats = indexer.reindex_incremental(options, None, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.sessions_indexed, 1);
        assert_eq!(stats.messages_indexed, 0);
        assert_eq!(stats.chunks_created, 0);
    }

    #[tokio::test]
    async fn cancellation_stops_before_remaining_sessions() {
        let (indexer, _search) = fresh_indexer(vec![("s1", "one"), ("s2", "two"), ("s3", "three")]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = indexer.reindex_full(None, cancel).await.unwrap();
        assert_eq!(stats.sessions_indexed, 0);
    }

    struct StubEmbedder;

    #[async_trait]
    impl claude_view_embedder::Embedder for StubEmbedder {
        fn available(&self) -> bool {
            true
        }
        fn model_name(&self) -> &str {
            "stub-embedding-model"
        }
        async fn embed_texts(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
            texts.iter().map(|_| Some(vec![0.1_f32, 0.2])).collect()
        }
    }

    #[tokio::test]
    async fn reindex_full_embeds_chunks_when_embedder_is_available() {
        let db = Database::new_in_memory().await.unwrap();
        let search = Arc::new(Search::with_defaults(db.clone(), None));
        let providers: Vec<Box<dyn Provider>> =
            vec![Box::new(FakeProvider { sessions: vec![("s1", "fix the login bug")] })];
        let embedder: Arc<dyn claude_view_embedder::Embedder> = Arc::new(StubEmbedder);
        let indexer = Indexer::new(db.clone(), search, providers, Some(embedder));

        indexer.reindex_full(None, CancellationToken::new()).await.unwrap();

        let chunks = db.get_session_chunks("s1").await.unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.embedding.is_some()));
        assert!(chunks.iter().all(|c| c.embedding_model.as_deref() == Some("stub-embedding-model")));
    }
}
