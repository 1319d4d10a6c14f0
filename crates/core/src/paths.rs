//! Centralized path functions for all app storage locations.
//!
//! Single source of truth — avoids ad-hoc `dirs::cache_dir().join(...)` calls
//! scattered across crates.

use std::path::PathBuf;

/// App cache root: `~/Library/Caches/agent-index/` (macOS) or `~/.cache/agent-index/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("agent-index"))
}

/// SQLite database file: `<app_cache_dir>/sessions.db`.
pub fn db_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("sessions.db"))
}

/// Legacy JSON (optionally gzip-compressed) summary cache, migrated into the
/// `summaries` table on first run and never written to again.
pub fn legacy_summary_cache_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("summaries_cache.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_cache_dir_is_namespaced() {
        let dir = app_cache_dir().expect("cache dir should resolve in test env");
        assert!(dir.to_string_lossy().contains("agent-index"));
    }

    #[test]
    fn db_path_ends_with_sessions_db() {
        let path = db_path().expect("cache dir should resolve in test env");
        assert!(path.to_string_lossy().ends_with("sessions.db"));
    }
}
