//! Derived per-project counters, recomputed after an indexing batch
//! touches a project.

use crate::{Database, DbResult};
use claude_view_core::types::ProjectStats;
use std::collections::HashMap;

impl Database {
    /// Recompute and upsert stats for one project path from its current
    /// session rows.
    pub async fn recompute_project_stats(&self, project_path: &str) -> DbResult<ProjectStats> {
        let sessions = self
            .get_sessions(
                &crate::queries::sessions::SessionFilter {
                    project_path: Some(project_path.to_string()),
                    ..Default::default()
                },
                i64::MAX,
                0,
            )
            .await?;

        let mut stats = ProjectStats {
            project_path: project_path.to_string(),
            ..Default::default()
        };
        let mut tag_counts: HashMap<String, u32> = HashMap::new();
        let mut harness_counts: HashMap<String, u32> = HashMap::new();

        for session in &sessions {
            stats.total_sessions += 1;
            if session.is_child {
                stats.child_sessions += 1;
            } else {
                stats.parent_sessions += 1;
            }
            if stats.project_name.is_empty() {
                stats.project_name = session.project_name.clone();
            }
            stats.total_messages += session.message_count;
            *harness_counts.entry(session.harness.clone()).or_default() += 1;
            for tag in &session.auto_tags {
                *tag_counts.entry(tag.clone()).or_default() += 1;
            }
            if let Some(t) = session.created_time {
                stats.first_session_time = Some(stats.first_session_time.map_or(t, |cur| cur.min(t)));
            }
            if let Some(t) = session.modified_time {
                stats.last_session_time = Some(stats.last_session_time.map_or(t, |cur| cur.max(t)));
            }
        }

        let mut tags: Vec<(String, u32)> = tag_counts.into_iter().collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        stats.common_tags = tags.into_iter().take(10).map(|(t, _)| t).collect();
        stats.harness_counts = harness_counts;
        stats.updated_at = now_epoch();

        self.upsert_project_stats(&stats).await?;
        Ok(stats)
    }

    pub async fn upsert_project_stats(&self, stats: &ProjectStats) -> DbResult<()> {
        let harness_counts = serde_json::to_string(&stats.harness_counts).unwrap_or_else(|_| "{}".into());
        let common_tags = serde_json::to_string(&stats.common_tags).unwrap_or_else(|_| "[]".into());
        sqlx::query(
            r#"
            INSERT INTO project_stats (
                project_path, project_name, total_sessions, parent_sessions, child_sessions,
                first_session_time, last_session_time, harness_counts, total_messages,
                common_tags, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(project_path) DO UPDATE SET
                project_name = excluded.project_name,
                total_sessions = excluded.total_sessions,
                parent_sessions = excluded.parent_sessions,
                child_sessions = excluded.child_sessions,
                first_session_time = excluded.first_session_time,
                last_session_time = excluded.last_session_time,
                harness_counts = excluded.harness_counts,
                total_messages = excluded.total_messages,
                common_tags = excluded.common_tags,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&stats.project_path)
        .bind(&stats.project_name)
        .bind(stats.total_sessions as i64)
        .bind(stats.parent_sessions as i64)
        .bind(stats.child_sessions as i64)
        .bind(stats.first_session_time)
        .bind(stats.last_session_time)
        .bind(harness_counts)
        .bind(stats.total_messages as i64)
        .bind(common_tags)
        .bind(stats.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_project_stats(&self, project_path: &str) -> DbResult<Option<ProjectStats>> {
        let row: Option<(String, String, i64, i64, i64, Option<i64>, Option<i64>, String, i64, String, i64)> =
            sqlx::query_as("SELECT * FROM project_stats WHERE project_path = ?1")
                .bind(project_path)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(row_to_stats))
    }

    pub async fn list_projects(&self) -> DbResult<Vec<ProjectStats>> {
        let rows: Vec<(String, String, i64, i64, i64, Option<i64>, Option<i64>, String, i64, String, i64)> =
            sqlx::query_as("SELECT * FROM project_stats ORDER BY last_session_time DESC NULLS LAST")
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(row_to_stats).collect())
    }
}

#[allow(clippy::type_complexity)]
fn row_to_stats(
    row: (String, String, i64, i64, i64, Option<i64>, Option<i64>, String, i64, String, i64),
) -> ProjectStats {
    let (
        project_path,
        project_name,
        total_sessions,
        parent_sessions,
        child_sessions,
        first_session_time,
        last_session_time,
        harness_counts,
        total_messages,
        common_tags,
        updated_at,
    ) = row;
    ProjectStats {
        project_path,
        project_name,
        total_sessions: total_sessions as u32,
        parent_sessions: parent_sessions as u32,
        child_sessions: child_sessions as u32,
        first_session_time,
        last_session_time,
        harness_counts: serde_json::from_str(&harness_counts).unwrap_or_default(),
        total_messages: total_messages as u32,
        common_tags: serde_json::from_str(&common_tags).unwrap_or_default(),
        updated_at,
    }
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
