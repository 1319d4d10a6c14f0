//! Append-only search history, for diagnostics and the "recent searches"
//! surface. Never read back by Search itself.

use crate::{Database, DbResult};
use claude_view_core::types::SearchLogEntry;

impl Database {
    pub async fn log_search(&self, entry: &SearchLogEntry) -> DbResult<()> {
        let top_session_ids = serde_json::to_string(&entry.top_session_ids).unwrap_or_else(|_| "[]".into());
        sqlx::query(
            r#"
            INSERT INTO search_log (query, result_count, top_session_ids, elapsed_ms, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&entry.query)
        .bind(entry.result_count as i64)
        .bind(top_session_ids)
        .bind(entry.elapsed_ms as i64)
        .bind(entry.timestamp)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Most recent searches, newest first.
    pub async fn recent_searches(&self, limit: i64) -> DbResult<Vec<SearchLogEntry>> {
        let rows: Vec<(String, i64, String, i64, i64)> = sqlx::query_as(
            "SELECT query, result_count, top_session_ids, elapsed_ms, timestamp \
             FROM search_log ORDER BY timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(query, result_count, top_session_ids, elapsed_ms, timestamp)| SearchLogEntry {
                query,
                result_count: result_count as u32,
                top_session_ids: serde_json::from_str(&top_session_ids).unwrap_or_default(),
                elapsed_ms: elapsed_ms as u64,
                timestamp,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(query: &str, ts: i64) -> SearchLogEntry {
        SearchLogEntry {
            query: query.into(),
            result_count: 3,
            top_session_ids: vec!["s1".into(), "s2".into()],
            elapsed_ms: 12,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn logs_accumulate_and_order_by_recency() {
        let db = Database::new_in_memory().await.unwrap();
        db.log_search(&entry("login bug", 100)).await.unwrap();
        db.log_search(&entry("flaky test", 200)).await.unwrap();

        let recent = db.recent_searches(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query, "flaky test");
        assert_eq!(recent[1].top_session_ids, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[tokio::test]
    async fn recent_searches_respects_limit() {
        let db = Database::new_in_memory().await.unwrap();
        for i in 0..5 {
            db.log_search(&entry(&format!("q{i}"), i)).await.unwrap();
        }
        assert_eq!(db.recent_searches(2).await.unwrap().len(), 2);
    }
}
