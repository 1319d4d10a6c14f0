//! One-time migration of the legacy JSON summary cache into the
//! `summaries` table. Runs at most once per database: gated on an
//! `index_meta` flag, never re-reads or rewrites the legacy file
//! afterward.
//!
//! The legacy format is `{session_id: {"hash": ..., "summary": ...}}`,
//! loaded once and keyed by session id.

use std::io::Read;
use std::path::Path;

use claude_view_db::Database;
use serde::Deserialize;

use crate::IndexerResult;

const MIGRATION_FLAG_KEY: &str = "legacy_summary_cache_migrated";

/// Model label stamped on summaries migrated from the legacy cache — the
/// legacy file never recorded which model produced each entry.
const LEGACY_MODEL_LABEL: &str = "legacy-cache";

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    hash: String,
    summary: String,
}

/// Migrate `cache_path` into the `summaries` table if it exists and this
/// database hasn't already migrated one. Returns the number of entries
/// migrated (0 if already migrated, or the file is absent/unreadable).
pub async fn migrate_legacy_summaries(db: &Database, cache_path: &Path) -> IndexerResult<usize> {
    if db.get_meta(MIGRATION_FLAG_KEY).await?.is_some() {
        return Ok(0);
    }

    // Mark migrated up front, even on a read/parse failure below — a
    // corrupt or absent legacy file is not something a later run should
    // keep retrying.
    db.set_meta(MIGRATION_FLAG_KEY, "true").await?;

    let Ok(bytes) = std::fs::read(cache_path) else {
        return Ok(0);
    };

    let json_bytes = if is_gzip(&bytes) {
        let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
        let mut decompressed = Vec::new();
        if decoder.read_to_end(&mut decompressed).is_err() {
            return Ok(0);
        }
        decompressed
    } else {
        bytes
    };

    let Ok(entries) = serde_json::from_slice::<std::collections::HashMap<String, LegacyEntry>>(&json_bytes) else {
        return Ok(0);
    };

    let migrated_at = now_epoch();
    let mut migrated = 0usize;
    for (session_id, entry) in entries {
        let summary = claude_view_core::types::Summary {
            session_id,
            text: entry.summary,
            model: LEGACY_MODEL_LABEL.to_string(),
            content_hash: entry.hash,
            created_at: migrated_at,
        };
        db.upsert_summary(&summary).await?;
        migrated += 1;
    }

    Ok(migrated)
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
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
    use claude_view_db::Database;

    #[tokio::test]
    async fn migrates_plain_json_once() {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries_cache.json");
        std::fs::write(
            &path,
            r#"{"s1": {"hash": "abc123def456", "summary": "fixed the login bug"}}"#,
        )
        .unwrap();

        let migrated = migrate_legacy_summaries(&db, &path).await.unwrap();
        assert_eq!(migrated, 1);

        let summary = db.get_summary("s1").await.unwrap().unwrap();
        assert_eq!(summary.text, "fixed the login bug");
        assert_eq!(summary.content_hash, "abc123def456");
        assert_eq!(summary.model, "legacy-cache");

        // Second call is a no-op even though the file still exists.
        std::fs::write(
            &path,
            r#"{"s2": {"hash": "zzz", "summary": "should not appear"}}"#,
        )
        .unwrap();
        let migrated_again = migrate_legacy_summaries(&db, &path).await.unwrap();
        assert_eq!(migrated_again, 0);
        assert!(db.get_summary("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn migrates_gzip_compressed_cache() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries_cache.json.gz");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(br#"{"s1": {"hash": "deadbeef0000", "summary": "refactored the parser"}}"#)
            .unwrap();
        let compressed = encoder.finish().unwrap();
        std::fs::write(&path, compressed).unwrap();

        let migrated = migrate_legacy_summaries(&db, &path).await.unwrap();
        assert_eq!(migrated, 1);
        let summary = db.get_summary("s1").await.unwrap().unwrap();
        assert_eq!(summary.text, "refactored the parser");
    }

    #[tokio::test]
    async fn missing_file_is_a_harmless_no_op() {
        let db = Database::new_in_memory().await.unwrap();
        let migrated = migrate_legacy_summaries(&db, Path::new("/nonexistent/path.json")).await.unwrap();
        assert_eq!(migrated, 0);
        assert!(db.get_meta(MIGRATION_FLAG_KEY).await.unwrap().is_some());
    }
}
