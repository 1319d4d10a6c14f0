//! Cursor sessions: no transcript files at all. Cursor keeps composer
//! ("chat") state as JSON blobs inside a single VS Code-style sqlite
//! key/value store (`cursorDiskKV`), read-only, never written by this
//! crate. There's no sub-agent concept here — every session is a parent.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use claude_view_core::error::{DiscoveryError, ParseError};
use claude_view_core::provider::{DiscoveredSession, MessageStream, Provider};
use claude_view_core::types::Session;
use regex_lite::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const COMPOSER_KEY_PREFIX: &str = "backgroundComposerModalInputData:";

pub struct CursorProvider {
    data_dir: Option<PathBuf>,
}

impl CursorProvider {
    pub fn new() -> Self {
        Self {
            data_dir: dirs::config_dir().map(|c| c.join("Cursor")),
        }
    }

    fn global_storage_db(&self) -> Option<PathBuf> {
        Some(self.data_dir.as_ref()?.join("User").join("globalStorage").join("state.vscdb"))
    }

    async fn connect(&self) -> Option<SqlitePool> {
        let db_path = self.global_storage_db()?;
        if !db_path.exists() {
            return None;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .ok()?
            .read_only(true);
        SqlitePoolOptions::new().max_connections(1).connect_with(options).await.ok()
    }
}

impl Default for CursorProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for CursorProvider {
    fn name(&self) -> &str {
        "cursor"
    }

    fn display_name(&self) -> &str {
        "Cursor"
    }

    fn icon(&self) -> &str {
        "⌘"
    }

    fn color(&self) -> &str {
        "blue"
    }

    fn fast_discovery(&self) -> bool {
        // Discovery means a sqlite query, not a directory listing.
        false
    }

    fn sessions_root(&self) -> Option<PathBuf> {
        self.data_dir.clone()
    }

    fn is_available(&self) -> bool {
        self.global_storage_db().is_some_and(|p| p.exists())
    }

    async fn discover(&self) -> Result<Vec<DiscoveredSession>, DiscoveryError> {
        let Some(db_path) = self.global_storage_db() else {
            return Err(DiscoveryError::HomeDirNotFound);
        };
        let Some(pool) = self.connect().await else {
            return Ok(Vec::new());
        };
        let mtime = file_mtime(&db_path).unwrap_or(0);

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM cursorDiskKV WHERE key LIKE 'backgroundComposerModalInputData:%'",
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| DiscoveryError::io(&db_path, std::io::Error::other(e)))?;

        Ok(rows
            .into_iter()
            .map(|(key,)| DiscoveredSession {
                session_id: key.trim_start_matches(COMPOSER_KEY_PREFIX).to_string(),
                mtime,
            })
            .collect())
    }

    async fn parse_metadata(&self, session_id: &str) -> Result<Option<Session>, ParseError> {
        let Some(db_path) = self.global_storage_db() else { return Ok(None) };
        let Some(pool) = self.connect().await else { return Ok(None) };

        let composer_key = format!("{COMPOSER_KEY_PREFIX}{session_id}");
        let composer_row: Option<(String,)> = sqlx::query_as("SELECT value FROM cursorDiskKV WHERE key = ?")
            .bind(&composer_key)
            .fetch_optional(&pool)
            .await
            .map_err(|e| ParseError::io(&db_path, std::io::Error::other(e)))?;

        let Some((composer_json,)) = composer_row else { return Ok(None) };
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&composer_json) else { return Ok(None) };
        let rich_text = data
            .get("composerData")
            .and_then(|c| c.get("richText"))
            .and_then(|r| r.as_str())
            .unwrap_or("");

        let first_prompt = extract_text_from_richtext(rich_text);
        if first_prompt.is_empty() {
            return Ok(None);
        }

        let project_path = find_project_path(rich_text).unwrap_or_else(|| dirs::home_dir().unwrap_or_default());
        let project_name = project_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Cursor".to_string());

        let details_key = format!("bcCachedDetails:{session_id}");
        let details_row: Option<(String,)> = sqlx::query_as("SELECT value FROM cursorDiskKV WHERE key = ?")
            .bind(&details_key)
            .fetch_optional(&pool)
            .await
            .map_err(|e| ParseError::io(&db_path, std::io::Error::other(e)))?;
        let last_response = details_row
            .and_then(|(v,)| serde_json::from_str::<serde_json::Value>(&v).ok())
            .and_then(|d| d.get("lastResponse").and_then(|r| r.as_str()).map(String::from))
            .map(|s| s.chars().take(2000).collect())
            .unwrap_or_default();

        let title = first_prompt
            .lines()
            .next()
            .map(|l| l.trim().chars().take(80).collect::<String>())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "Cursor Session".to_string());

        let modified_time = file_mtime(&db_path);

        let mut session = Session::new(session_id, self.name());
        session.project_path = project_path.to_string_lossy().to_string();
        session.project_name = project_name;
        session.title = title;
        session.first_prompt = first_prompt.clone();
        session.last_prompt = first_prompt.clone();
        session.last_response = last_response;
        session.modified_time = modified_time;
        session.raw_path = db_path.to_string_lossy().to_string();
        session.file_mtime = modified_time;
        session.first_prompt_preview = Some(first_prompt.chars().take(200).collect());

        Ok(Some(session))
    }

    async fn iter_messages<'a>(&'a self, _session_id: &'a str) -> MessageStream<'a> {
        // Cursor's composer store holds only the latest prompt/response pair,
        // already surfaced through parse_metadata; there's no turn history to stream.
        Box::pin(tokio_stream::empty())
    }

    fn resume_command(&self, _session_id: &str) -> Option<String> {
        None
    }
}

fn file_mtime(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    modified.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs() as i64)
}

/// Flatten Cursor's Lexical editor-state JSON (a tree of `root.children`)
/// to plain text, expanding `@mention` nodes to `@name`.
fn extract_text_from_richtext(richtext_json: &str) -> String {
    let Ok(data) = serde_json::from_str::<serde_json::Value>(richtext_json) else {
        return String::new();
    };
    let mut texts = Vec::new();
    if let Some(root) = data.get("root") {
        walk_lexical_nodes(root, &mut texts);
    }
    texts.join(" ").trim().to_string()
}

fn walk_lexical_nodes(node: &serde_json::Value, texts: &mut Vec<String>) {
    match node {
        serde_json::Value::Object(obj) => {
            match obj.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                        texts.push(text.to_string());
                    }
                }
                Some("mention") => {
                    let name = obj.get("mentionName").and_then(|n| n.as_str()).unwrap_or("");
                    texts.push(format!("@{name}"));
                }
                _ => {}
            }
            if let Some(children) = obj.get("children").and_then(|c| c.as_array()) {
                for child in children {
                    walk_lexical_nodes(child, texts);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                walk_lexical_nodes(item, texts);
            }
        }
        _ => {}
    }
}

/// Find a project root from the first `fsPath` reference in the richtext
/// blob, walking up to the nearest directory that looks like a project
/// root (has `.git` or `package.json`).
fn find_project_path(richtext_json: &str) -> Option<PathBuf> {
    let re = Regex::new(r#""fsPath":"([^"]+)""#).unwrap();
    let caps = re.captures(richtext_json)?;
    let file_path = PathBuf::from(&caps[1]);

    let mut current = file_path.parent()?;
    loop {
        if current.join(".git").exists() || current.join("package.json").exists() {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => return file_path.parent().map(Path::to_path_buf),
        }
    }
}
