//! Stable Read API surface consumed by the UI/CLI collaborator: a single
//! `ReadApi` wrapping an `AppContext` of already-open handles (db, search,
//! indexer). Not exposed over HTTP or any other wire protocol in this
//! workspace — the collaborator links against it as a Rust library, one
//! facade struct in front of every subsystem handle rather than scattered
//! direct dependencies on db/search/indexer.

use std::sync::Arc;

use claude_view_core::types::{Message, Session};
use claude_view_db::{Database, DbError, SessionFilter};
use claude_view_embedder::{Embedder, EmbedderConfig, OpenAiCompatibleEmbedder};
use claude_view_indexer::{IncrementalOptions, Indexer, IndexerError, ProgressFn, Stats};
use claude_view_search::{Search, SearchConfig, SearchError, SearchResult};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("search error: {0}")]
    Search(#[from] SearchError),
    #[error("indexer error: {0}")]
    Indexer(#[from] IndexerError),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Handles every API method needs: the store, the hybrid search pipeline,
/// and the indexer, all sharing the same `Database` clone (a cheap
/// `SqlitePool` handle, not a second connection pool).
pub struct AppContext {
    db: Database,
    search: Arc<Search>,
    indexer: Indexer,
}

impl AppContext {
    pub fn new(db: Database, search: Arc<Search>, indexer: Indexer) -> Self {
        Self { db, search, indexer }
    }

    /// Wire up the default providers and an embedder gated on
    /// `AGENT_INDEX_EMBEDDING_API_KEY`, against a database opened at the
    /// default path (or `AGENT_INDEX_DB_PATH`).
    pub async fn open_default() -> ApiResult<Self> {
        let db = Database::open_default().await?;
        if let Some(cache_path) = claude_view_core::paths::legacy_summary_cache_path() {
            claude_view_indexer::migrate_legacy_summaries(&db, &cache_path).await?;
        }
        let embedder = default_embedder();
        let search = Arc::new(Search::with_defaults(db.clone(), embedder.clone()));
        let providers = claude_view_providers::default_providers();
        let indexer = Indexer::new(db.clone(), search.clone(), providers, embedder);
        Ok(Self::new(db, search, indexer))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn search(&self) -> &Arc<Search> {
        &self.search
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }
}

fn default_embedder() -> Option<Arc<dyn Embedder>> {
    let embedder = OpenAiCompatibleEmbedder::new(EmbedderConfig::default());
    if embedder.available() {
        Some(Arc::new(embedder))
    } else {
        None
    }
}

/// The stable query surface the UI/CLI collaborator links against.
/// Every method is a thin pass-through onto `AppContext`'s handles — this
/// struct exists so the collaborator depends on one crate/type instead of
/// reaching into `db`/`search`/`indexer` directly.
pub struct ReadApi {
    ctx: AppContext,
}

impl ReadApi {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn open_default() -> ApiResult<Self> {
        Ok(Self::new(AppContext::open_default().await?))
    }

    pub async fn list_sessions(&self, filter: &SessionFilter, limit: i64, offset: i64) -> ApiResult<Vec<Session>> {
        Ok(self.ctx.db.get_sessions(filter, limit, offset).await?)
    }

    pub async fn get_session(&self, id: &str) -> ApiResult<Option<Session>> {
        Ok(self.ctx.db.get_session(id).await?)
    }

    pub async fn get_messages(&self, session_id: &str) -> ApiResult<Vec<Message>> {
        Ok(self.ctx.db.get_session_messages(session_id).await?)
    }

    pub async fn get_related_children(&self, parent: &Session) -> ApiResult<Vec<Session>> {
        Ok(self.ctx.indexer.get_related_children(parent).await?)
    }

    pub async fn search(&self, query: &str, limit: usize) -> ApiResult<Vec<SearchResult>> {
        Ok(self.ctx.search.search(query, limit).await?)
    }

    pub async fn reindex_incremental(
        &self,
        options: IncrementalOptions,
        progress: Option<&ProgressFn<'_>>,
        cancel: CancellationToken,
    ) -> ApiResult<Stats> {
        Ok(self.ctx.indexer.reindex_incremental(options, progress, cancel).await?)
    }

    pub async fn reindex_full(&self, progress: Option<&ProgressFn<'_>>, cancel: CancellationToken) -> ApiResult<Stats> {
        Ok(self.ctx.indexer.reindex_full(progress, cancel).await?)
    }

    pub async fn get_project_stats(
        &self,
        project_path: &str,
    ) -> ApiResult<Option<claude_view_core::types::ProjectStats>> {
        Ok(self.ctx.db.get_project_stats(project_path).await?)
    }

    pub async fn list_projects(&self) -> ApiResult<Vec<claude_view_core::types::ProjectStats>> {
        Ok(self.ctx.db.list_projects().await?)
    }
}

/// `SearchConfig` is re-exported so a collaborator building a custom
/// `AppContext` (e.g. in tests) can tune fusion weights without a direct
/// dependency on `claude-view-search`.
pub use claude_view_search::SearchConfig as ReadApiSearchConfig;

#[cfg(test)]
mod tests {
    use super::*;
    use claude_view_core::error::{DiscoveryError, ParseError};
    use claude_view_core::provider::{DiscoveredSession, MessageStream, Provider};
    use claude_view_core::types::Role;
    use std::path::PathBuf;

    struct FakeProvider {
        sessions: Vec<(&'static str, &'static str)>,
    }

    #[async_trait::async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn display_name(&self) -> &str {
            "Fake"
        }

        fn sessions_root(&self) -> Option<PathBuf> {
            None
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn discover(&self) -> Result<Vec<DiscoveredSession>, DiscoveryError> {
            Ok(self
                .sessions
                .iter()
                .map(|(id, _)| DiscoveredSession { session_id: id.to_string(), mtime: 1 })
                .collect())
        }

        async fn parse_metadata(&self, session_id: &str) -> Result<Option<Session>, ParseError> {
            let Some((id, prompt)) = self.sessions.iter().find(|(id, _)| *id == session_id) else {
                return Ok(None);
            };
            Ok(Some(Session {
                id: id.to_string(),
                harness: self.name().to_string(),
                project_path: "/tmp/project".to_string(),
                project_name: "project".to_string(),
                title: String::new(),
                first_prompt: prompt.to_string(),
                last_prompt: prompt.to_string(),
                last_response: String::new(),
                created_time: Some(1),
                modified_time: Some(1),
                is_child: false,
                child_type: String::new(),
                parent_id: None,
                message_count: 0,
                turn_count: 0,
                first_prompt_preview: None,
                raw_path: "/tmp/project/s1.jsonl".to_string(),
                file_mtime: Some(1),
                indexed_at: None,
                auto_tags: Vec::new(),
            }))
        }

        async fn iter_messages<'a>(&'a self, session_id: &'a str) -> MessageStream<'a> {
            let Some((id, prompt)) = self.sessions.iter().find(|(id, _)| *id == session_id) else {
                return Box::pin(tokio_stream::empty());
            };
            let message = Message {
                id: format!("{id}-0"),
                session_id: id.to_string(),
                role: Role::User,
                content: prompt.to_string(),
                timestamp: Some(1),
                sequence: 0,
                has_code: false,
                tool_mentions: None,
            };
            Box::pin(tokio_stream::once(Ok(message)))
        }
    }

    async fn ctx_with_one_session() -> AppContext {
        let db = Database::new_in_memory().await.unwrap();
        let search = Arc::new(Search::with_defaults(db.clone(), None));
        let providers: Vec<Box<dyn Provider>> =
            vec![Box::new(FakeProvider { sessions: vec![("s1", "fix the login bug")] })];
        let indexer = Indexer::new(db.clone(), search.clone(), providers, None);
        AppContext::new(db, search, indexer)
    }

    #[tokio::test]
    async fn full_reindex_then_list_and_fetch_round_trips() {
        let ctx = ctx_with_one_session().await;
        let api = ReadApi::new(ctx);

        let stats = api.reindex_full(None, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.sessions_indexed, 1);

        let sessions = api.list_sessions(&SessionFilter::default(), 10, 0).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "s1");

        let fetched = api.get_session("s1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "s1");

        let messages = api.get_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 1);

        assert!(api.get_session("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_finds_reindexed_session_by_lexical_match() {
        let ctx = ctx_with_one_session().await;
        let api = ReadApi::new(ctx);
        api.reindex_full(None, CancellationToken::new()).await.unwrap();

        let results = api.search("login bug", 10).await.unwrap();
        assert!(results.iter().any(|r| r.session_id == "s1"));
    }

    #[tokio::test]
    async fn list_projects_reflects_recomputed_stats_after_reindex() {
        let ctx = ctx_with_one_session().await;
        let api = ReadApi::new(ctx);
        api.reindex_full(None, CancellationToken::new()).await.unwrap();

        let projects = api.list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].project_path, "/tmp/project");

        let stats = api.get_project_stats("/tmp/project").await.unwrap();
        assert!(stats.is_some());
    }
}
