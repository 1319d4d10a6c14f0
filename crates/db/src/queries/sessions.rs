//! Session CRUD: upsert, point lookup, filtered listing, cascade delete,
//! parent/child lookup, and the session-metadata full-text search pass.

use crate::{Database, DbError, DbResult};
use claude_view_core::types::Session;
use sqlx::Row;

/// Filter options for `get_sessions`, mirrors `claude_view_core::SessionFilter`
/// but lives here so query code doesn't need to round-trip through core.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub harness: Option<String>,
    pub project_path: Option<String>,
    pub is_child: Option<bool>,
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, sqlx::Error> {
    let auto_tags_json: String = row.try_get("auto_tags")?;
    let auto_tags: Vec<String> = serde_json::from_str(&auto_tags_json).unwrap_or_default();
    Ok(Session {
        id: row.try_get("id")?,
        harness: row.try_get("harness")?,
        project_path: row.try_get("project_path")?,
        project_name: row.try_get("project_name")?,
        title: row.try_get("title")?,
        first_prompt: row.try_get("first_prompt")?,
        last_prompt: row.try_get("last_prompt")?,
        last_response: row.try_get("last_response")?,
        created_time: row.try_get("created_time")?,
        modified_time: row.try_get("modified_time")?,
        is_child: row.try_get::<i64, _>("is_child")? != 0,
        child_type: row.try_get("child_type")?,
        parent_id: row.try_get("parent_id")?,
        message_count: row.try_get::<i64, _>("message_count")? as u32,
        turn_count: row.try_get::<i64, _>("turn_count")? as u32,
        first_prompt_preview: row.try_get("first_prompt_preview")?,
        raw_path: row.try_get("raw_path")?,
        file_mtime: row.try_get("file_mtime")?,
        indexed_at: row.try_get("indexed_at")?,
        auto_tags,
    })
}

impl Database {
    /// Insert or fully replace one session row. If `session.parent_id` is
    /// set but the referenced row doesn't exist, the caller (Indexer) is
    /// responsible for nulling it first — this method does not validate,
    /// it trusts the caller's safe parent linkage. A foreign-key violation
    /// here is surfaced as-is.
    pub async fn upsert_session(&self, session: &Session) -> DbResult<()> {
        let auto_tags = serde_json::to_string(&session.auto_tags).unwrap_or_else(|_| "[]".into());
        self.with_busy_retry(|| {
            let auto_tags = auto_tags.clone();
            async {
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
                .execute(self.pool())
                .await
            }
        })
        .await?;
        Ok(())
    }

    /// Null out `parent_id` for a session, used when a provider reports a
    /// parent that doesn't exist in the Store yet.
    pub async fn clear_parent_id(&self, session_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE sessions SET parent_id = NULL WHERE id = ?1")
            .bind(session_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn session_exists(&self, session_id: &str) -> DbResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn get_session(&self, id: &str) -> DbResult<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(row_to_session).transpose().map_err(DbError::from)
    }

    /// Delete a session and everything that cascades from it (messages,
    /// chunks, summary) via `ON DELETE CASCADE` foreign keys.
    pub async fn delete_session(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn get_sessions(
        &self,
        filter: &SessionFilter,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Session>> {
        let mut sql = String::from("SELECT * FROM sessions WHERE 1=1");
        if filter.harness.is_some() {
            sql.push_str(" AND harness = ?");
        }
        if filter.project_path.is_some() {
            sql.push_str(" AND project_path = ?");
        }
        if filter.is_child.is_some() {
            sql.push_str(" AND is_child = ?");
        }
        sql.push_str(" ORDER BY modified_time DESC NULLS LAST LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(h) = &filter.harness {
            query = query.bind(h);
        }
        if let Some(p) = &filter.project_path {
            query = query.bind(p);
        }
        if let Some(c) = filter.is_child {
            query = query.bind(c as i64);
        }
        query = query.bind(limit).bind(offset);

        let rows = query.fetch_all(self.pool()).await?;
        rows.iter().map(row_to_session).collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub async fn count_sessions(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }

    /// Sessions sharing a project path and harness as `parent_id`, used by
    /// `get_related_children`'s temporal-proximity heuristic — the
    /// candidates here are narrowed by path/harness only; the caller
    /// applies the time-window check (read-time, not index-time).
    pub async fn get_orphan_candidates(
        &self,
        project_path: &str,
        harness: &str,
    ) -> DbResult<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE project_path = ?1 AND harness = ?2 AND is_child = 1 AND parent_id IS NULL",
        )
        .bind(project_path)
        .bind(harness)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_session).collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Direct (linked) children of a parent session.
    pub async fn get_children(&self, parent_id: &str) -> DbResult<Vec<Session>> {
        let rows = sqlx::query("SELECT * FROM sessions WHERE parent_id = ?1 ORDER BY created_time ASC")
            .bind(parent_id)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(row_to_session).collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// All sessions that are not children (candidate parents).
    pub async fn get_parents(&self) -> DbResult<Vec<Session>> {
        let rows = sqlx::query("SELECT * FROM sessions WHERE is_child = 0")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(row_to_session).collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Session-metadata full-text search: `first_prompt_preview`,
    /// `project_name`, `auto_tags`. Returns `(session_id, bm25)` with
    /// lower-is-better polarity, unconverted — Search inverts it.
    pub async fn search_sessions_fts(&self, query: &str, limit: i64) -> DbResult<Vec<(String, f64)>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT s.id AS session_id, bm25(sessions_fts) AS score
            FROM sessions_fts
            JOIN sessions s ON s.rowid = sessions_fts.rowid
            WHERE sessions_fts MATCH ?1
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
