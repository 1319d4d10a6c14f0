//! OpenCode sessions: XDG-style storage with one JSON file per message
//! (`storage/message/<session-id>/<message-id>.json`) and the message's
//! text split further into `storage/part/<message-id>/*.json` part files.
//! Session-level metadata (title, `parentID`) lives in a third tree,
//! `storage/session/<project-hash>/<session-id>.json`.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use claude_view_core::error::{DiscoveryError, ParseError};
use claude_view_core::provider::{DiscoveredSession, MessageStream, Provider};
use claude_view_core::types::{Message, Role, Session};
use tracing::debug;

fn detect_child_type(first_prompt: &str) -> String {
    let upper: String = first_prompt.chars().take(500).collect::<String>().to_uppercase();
    if upper.contains("FILE-ANALYSIS") {
        "file-analysis".to_string()
    } else {
        "worker".to_string()
    }
}

pub struct OpenCodeProvider {
    data_dir: Option<PathBuf>,
}

impl OpenCodeProvider {
    pub fn new() -> Self {
        Self {
            data_dir: dirs::data_dir().map(|d| d.join("opencode")),
        }
    }

    fn storage_dir(&self) -> Option<PathBuf> {
        Some(self.data_dir.as_ref()?.join("storage"))
    }

    fn message_dir(&self) -> Option<PathBuf> {
        Some(self.storage_dir()?.join("message"))
    }

    fn part_dir(&self) -> Option<PathBuf> {
        Some(self.storage_dir()?.join("part"))
    }

    fn session_meta_dir(&self) -> Option<PathBuf> {
        Some(self.storage_dir()?.join("session"))
    }

    fn load_session_meta(&self, session_id: &str) -> Option<serde_json::Value> {
        let root = self.session_meta_dir()?;
        for entry in std::fs::read_dir(&root).ok()?.filter_map(|e| e.ok()) {
            if !entry.path().is_dir() {
                continue;
            }
            let candidate = entry.path().join(format!("{session_id}.json"));
            if candidate.is_file() {
                let text = std::fs::read_to_string(candidate).ok()?;
                return serde_json::from_str(&text).ok();
            }
        }
        None
    }

    fn message_content(&self, message_id: &str) -> String {
        let Some(part_dir) = self.part_dir() else { return String::new() };
        let msg_dir = part_dir.join(message_id);
        let Ok(entries) = std::fs::read_dir(&msg_dir) else { return String::new() };

        let mut part_files: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        part_files.sort();

        let mut texts = Vec::new();
        for part_file in part_files {
            let Ok(text) = std::fs::read_to_string(&part_file) else { continue };
            let Ok(part) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
            if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                    texts.push(t.to_string());
                }
            }
        }
        texts.join("\n")
    }
}

impl Default for OpenCodeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for OpenCodeProvider {
    fn name(&self) -> &str {
        "opencode"
    }

    fn display_name(&self) -> &str {
        "OpenCode"
    }

    fn icon(&self) -> &str {
        "💻"
    }

    fn color(&self) -> &str {
        "magenta"
    }

    fn fast_discovery(&self) -> bool {
        // Discovery walks a message-file tree per session, not a flat listing.
        false
    }

    fn long_running_child_window(&self) -> Option<std::time::Duration> {
        // OpenCode sub-agents run throughout a workday; widen the orphan-matching
        // window beyond the 2h default so sessions kicked off hours apart still link.
        Some(std::time::Duration::from_secs(24 * 3600))
    }

    fn sessions_root(&self) -> Option<PathBuf> {
        self.data_dir.clone()
    }

    async fn discover(&self) -> Result<Vec<DiscoveredSession>, DiscoveryError> {
        let Some(message_dir) = self.message_dir() else {
            return Err(DiscoveryError::HomeDirNotFound);
        };
        if !message_dir.exists() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut sessions = tokio::fs::read_dir(&message_dir)
            .await
            .map_err(|e| DiscoveryError::io(&message_dir, e))?;
        while let Ok(Some(session_dir)) = sessions.next_entry().await {
            let path = session_dir.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !path.is_dir() || !name.starts_with("ses_") {
                continue;
            }
            let mut max_mtime = 0i64;
            if let Ok(mut files) = tokio::fs::read_dir(&path).await {
                while let Ok(Some(file)) = files.next_entry().await {
                    if let Ok(meta) = file.metadata().await {
                        if let Ok(modified) = meta.modified() {
                            if let Ok(secs) = modified.duration_since(UNIX_EPOCH) {
                                max_mtime = max_mtime.max(secs.as_secs() as i64);
                            }
                        }
                    }
                }
            }
            out.push(DiscoveredSession { session_id: name.to_string(), mtime: max_mtime });
        }
        Ok(out)
    }

    async fn parse_metadata(&self, session_id: &str) -> Result<Option<Session>, ParseError> {
        let Some(message_dir) = self.message_dir() else { return Ok(None) };
        let session_message_dir = message_dir.join(session_id);
        if !session_message_dir.exists() {
            return Ok(None);
        }

        let mut message_files: Vec<PathBuf> = match std::fs::read_dir(&session_message_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(e) => return Err(ParseError::io(&session_message_dir, e)),
        };
        message_files.sort();

        let mut project_path: Option<PathBuf> = None;
        let mut created_time: Option<i64> = None;
        let mut modified_time: Option<i64> = None;
        let mut first_prompt = String::new();
        let mut last_user_prompt = String::new();
        let mut last_assistant_response = String::new();
        let mut seen_messages = false;

        for msg_file in &message_files {
            let Ok(text) = std::fs::read_to_string(msg_file) else { continue };
            let Ok(msg) = serde_json::from_str::<serde_json::Value>(&text) else { continue };

            let role = msg.get("role").and_then(|r| r.as_str()).unwrap_or("");
            let time = msg.get("time");
            if let Some(created) = time.and_then(|t| t.get("created")).and_then(|t| t.as_i64()) {
                let ts = created / 1000;
                created_time = Some(created_time.map_or(ts, |cur: i64| cur.min(ts)));
            }
            if let Some(completed) = time.and_then(|t| t.get("completed")).and_then(|t| t.as_i64()) {
                let ts = completed / 1000;
                modified_time = Some(modified_time.map_or(ts, |cur: i64| cur.max(ts)));
            }

            if project_path.is_none() {
                if let Some(path_data) = msg.get("path") {
                    if let Some(root) = path_data.get("root").and_then(|r| r.as_str()) {
                        project_path = Some(PathBuf::from(root));
                    } else if let Some(cwd) = path_data.get("cwd").and_then(|r| r.as_str()) {
                        project_path = Some(PathBuf::from(cwd));
                    }
                }
            }

            let msg_id = msg.get("id").and_then(|v| v.as_str()).unwrap_or("");
            let content = self.message_content(msg_id);
            if content.is_empty() {
                continue;
            }
            seen_messages = true;
            match role {
                "user" => {
                    if first_prompt.is_empty() {
                        first_prompt = content.clone();
                    }
                    last_user_prompt = content;
                }
                "assistant" => last_assistant_response = content,
                _ => {}
            }
        }

        if !seen_messages {
            return Ok(None);
        }

        let session_meta = self.load_session_meta(session_id);
        let parent_id = session_meta
            .as_ref()
            .and_then(|m| m.get("parentID"))
            .and_then(|p| p.as_str())
            .map(String::from);
        let meta_title = session_meta
            .as_ref()
            .and_then(|m| m.get("title"))
            .and_then(|t| t.as_str())
            .map(String::from);
        if project_path.is_none() {
            if let Some(dir) = session_meta.as_ref().and_then(|m| m.get("directory")).and_then(|d| d.as_str()) {
                project_path = Some(PathBuf::from(dir));
            }
        }

        let project_path = project_path.unwrap_or_else(|| dirs::home_dir().unwrap_or_default());
        let project_name = project_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "OpenCode".to_string());

        let is_child = parent_id.is_some();
        let child_type = if is_child { detect_child_type(&first_prompt) } else { String::new() };

        let title = meta_title
            .filter(|t| !t.is_empty())
            .or_else(|| {
                first_prompt
                    .lines()
                    .find(|l| !l.trim().starts_with('<'))
                    .map(|l| l.trim().chars().take(80).collect())
            })
            .unwrap_or_else(|| "OpenCode Session".to_string());

        let mut session = Session::new(session_id, self.name());
        session.project_path = project_path.to_string_lossy().to_string();
        session.project_name = project_name;
        session.title = title;
        session.first_prompt = first_prompt.clone();
        session.last_prompt = last_user_prompt;
        session.last_response = last_assistant_response;
        session.created_time = created_time;
        session.modified_time = modified_time;
        session.is_child = is_child;
        session.child_type = child_type;
        session.parent_id = parent_id;
        session.raw_path = session_message_dir.to_string_lossy().to_string();
        session.file_mtime = modified_time;
        session.first_prompt_preview = Some(first_prompt.chars().take(200).collect());

        Ok(Some(session))
    }

    async fn iter_messages<'a>(&'a self, session_id: &'a str) -> MessageStream<'a> {
        let Some(message_dir) = self.message_dir() else {
            return Box::pin(tokio_stream::empty());
        };
        let session_message_dir = message_dir.join(session_id);
        let session_id = session_id.to_string();

        let mut message_files: Vec<PathBuf> = match std::fs::read_dir(&session_message_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => return Box::pin(tokio_stream::empty()),
        };
        message_files.sort();

        Box::pin(async_stream::stream! {
            let mut sequence = 0u32;
            for msg_file in message_files {
                let text = match tokio::fs::read_to_string(&msg_file).await {
                    Ok(t) => t,
                    Err(e) => {
                        yield Err(ParseError::io(&msg_file, e));
                        continue;
                    }
                };
                let msg: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(_) => {
                        debug!(%session_id, ?msg_file, "skipping malformed message file");
                        continue;
                    }
                };
                let role_str = msg.get("role").and_then(|r| r.as_str()).unwrap_or("");
                if role_str.is_empty() {
                    continue;
                }
                let msg_id = msg.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let content = message_content_sync(&msg_file, &msg_id);
                if content.is_empty() {
                    continue;
                }
                let timestamp = msg
                    .get("time")
                    .and_then(|t| t.get("created"))
                    .and_then(|t| t.as_i64())
                    .map(|ms| ms / 1000);

                yield Ok(Message {
                    id: if msg_id.is_empty() { format!("{session_id}_{sequence}") } else { msg_id },
                    session_id: session_id.clone(),
                    role: Role::parse(role_str),
                    has_code: Message::detect_has_code(&content),
                    content,
                    timestamp,
                    sequence,
                    tool_mentions: None,
                });
                sequence += 1;
            }
        })
    }

    fn resume_command(&self, session_id: &str) -> Option<String> {
        Some(format!("opencode --resume {session_id}"))
    }
}

/// Standalone helper so `iter_messages`'s generator body (which can't borrow
/// `self` across yield points as a `Stream`) can still read part files.
fn message_content_sync(msg_file: &std::path::Path, message_id: &str) -> String {
    // msg_file = storage/message/<session_id>/<file>.json
    let Some(message_root) = msg_file.parent().and_then(|p| p.parent()) else { return String::new() };
    let part_dir = message_root.parent().map(|storage| storage.join("part")).unwrap_or_default();
    let msg_part_dir = part_dir.join(message_id);
    let Ok(entries) = std::fs::read_dir(&msg_part_dir) else { return String::new() };

    let mut part_files: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    part_files.sort();

    let mut texts = Vec::new();
    for part_file in part_files {
        let Ok(text) = std::fs::read_to_string(&part_file) else { continue };
        let Ok(part) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
        if part.get("type").and_then(|t| t.as_str()) == Some("text") {
            if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                texts.push(t.to_string());
            }
        }
    }
    texts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_part(part_dir: &std::path::Path, message_id: &str, text: &str) {
        let dir = part_dir.join(message_id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("0.json"), serde_json::json!({"type": "text", "text": text}).to_string()).unwrap();
    }

    #[tokio::test]
    async fn parses_messages_and_resolves_project_path() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = tmp.path().join("storage");
        let message_dir = storage.join("message").join("ses_abc");
        let part_dir = storage.join("part");
        std::fs::create_dir_all(&message_dir).unwrap();
        std::fs::create_dir_all(&part_dir).unwrap();

        write_part(&part_dir, "msg1", "help me fix this");
        write_part(&part_dir, "msg2", "sure, let's look");

        std::fs::write(
            message_dir.join("0-msg1.json"),
            serde_json::json!({
                "id": "msg1", "role": "user",
                "time": {"created": 1_700_000_000_000i64},
                "path": {"root": "/Users/dev/demo"}
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            message_dir.join("1-msg2.json"),
            serde_json::json!({"id": "msg2", "role": "assistant", "time": {"completed": 1_700_000_010_000i64}}).to_string(),
        )
        .unwrap();

        let provider = OpenCodeProvider { data_dir: Some(tmp.path().to_path_buf()) };
        let session = provider.parse_metadata("ses_abc").await.unwrap().unwrap();
        assert_eq!(session.project_path, "/Users/dev/demo");
        assert_eq!(session.first_prompt, "help me fix this");
        assert_eq!(session.last_response, "sure, let's look");
        assert!(!session.is_child);
    }

    #[tokio::test]
    async fn parent_id_from_session_metadata_marks_child() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = tmp.path().join("storage");
        let message_dir = storage.join("message").join("ses_child");
        let part_dir = storage.join("part");
        let meta_dir = storage.join("session").join("proj1");
        std::fs::create_dir_all(&message_dir).unwrap();
        std::fs::create_dir_all(&part_dir).unwrap();
        std::fs::create_dir_all(&meta_dir).unwrap();

        write_part(&part_dir, "msg1", "do one task only");
        std::fs::write(
            message_dir.join("0-msg1.json"),
            serde_json::json!({"id": "msg1", "role": "user"}).to_string(),
        )
        .unwrap();
        std::fs::write(
            meta_dir.join("ses_child.json"),
            serde_json::json!({"parentID": "ses_parent", "title": "Worker task"}).to_string(),
        )
        .unwrap();

        let provider = OpenCodeProvider { data_dir: Some(tmp.path().to_path_buf()) };
        let session = provider.parse_metadata("ses_child").await.unwrap().unwrap();
        assert!(session.is_child);
        assert_eq!(session.parent_id, Some("ses_parent".to_string()));
        assert_eq!(session.title, "Worker task");
    }
}
