//! Factory Droid sessions: `~/.factory/sessions/<encoded-project-dir>/<session-id>.jsonl`,
//! the same line-delimited JSON shape as Claude Code but with `session_start`/
//! `message` entry types instead of `user`/`assistant` at the top level.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use claude_view_core::error::{DiscoveryError, ParseError};
use claude_view_core::provider::{DiscoveredSession, MessageStream, Provider};
use claude_view_core::types::{Message, Role, Session};
use regex_lite::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::content::{extract_text_content, is_system_reminder};
use crate::path_decode::decode_project_path;

pub struct DroidProvider {
    sessions_dir: Option<PathBuf>,
}

impl DroidProvider {
    pub fn new() -> Self {
        Self {
            sessions_dir: dirs::home_dir().map(|h| h.join(".factory").join("sessions")),
        }
    }

    fn find_session_file(&self, session_id: &str) -> Option<PathBuf> {
        let root = self.sessions_dir.as_ref()?;
        let project_dirs = std::fs::read_dir(root).ok()?;
        for entry in project_dirs.filter_map(|e| e.ok()) {
            if !entry.path().is_dir() {
                continue;
            }
            let candidate = entry.path().join(format!("{session_id}.jsonl"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

impl Default for DroidProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for DroidProvider {
    fn name(&self) -> &str {
        "droid"
    }

    fn display_name(&self) -> &str {
        "Factory Droid"
    }

    fn icon(&self) -> &str {
        "🤖"
    }

    fn color(&self) -> &str {
        "green"
    }

    fn sessions_root(&self) -> Option<PathBuf> {
        self.sessions_dir.clone()
    }

    async fn discover(&self) -> Result<Vec<DiscoveredSession>, DiscoveryError> {
        let Some(root) = &self.sessions_dir else {
            return Err(DiscoveryError::HomeDirNotFound);
        };
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut project_dirs = tokio::fs::read_dir(root).await.map_err(|e| DiscoveryError::io(root, e))?;
        while let Some(project_dir) = project_dirs.next_entry().await.map_err(|e| DiscoveryError::io(root, e))? {
            if !project_dir.path().is_dir() {
                continue;
            }
            let mut files = match tokio::fs::read_dir(project_dir.path()).await {
                Ok(f) => f,
                Err(_) => continue,
            };
            while let Ok(Some(file)) = files.next_entry().await {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
                let mtime = file_mtime(&path).unwrap_or(0);
                out.push(DiscoveredSession { session_id: stem.to_string(), mtime });
            }
        }
        Ok(out)
    }

    async fn parse_metadata(&self, session_id: &str) -> Result<Option<Session>, ParseError> {
        let Some(path) = self.find_session_file(session_id) else {
            return Ok(None);
        };
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return Err(ParseError::io(&path, e)),
        };

        let project_dir_name = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("");

        let mut cwd: Option<String> = None;
        let mut title = String::new();
        let mut is_subagent = false;
        let mut subagent_type = String::new();
        let mut created_time: Option<i64> = None;
        let mut first_user_prompt = String::new();
        let mut last_user_prompt = String::new();
        let mut last_assistant_response = String::new();
        let mut seen_messages = false;
        let subagent_title_re = Regex::new(r"Subagent type: ([a-zA-Z0-9_-]+)").unwrap();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else { continue };
            let Some(entry_type) = value.get("type").and_then(|t| t.as_str()) else { continue };

            if entry_type == "session_start" {
                let raw_title = value
                    .get("title")
                    .or_else(|| value.get("sessionTitle"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("Untitled");
                title = raw_title.chars().take(80).collect();
                cwd = value.get("cwd").and_then(|v| v.as_str()).map(String::from);

                if title.starts_with("# Task Tool Invocation") {
                    is_subagent = true;
                    if let Some(caps) = subagent_title_re.captures(&title) {
                        subagent_type = caps[1].to_string();
                    }
                }
            } else if entry_type == "message" {
                let Some(msg) = value.get("message") else { continue };
                let Some(role) = msg.get("role").and_then(|r| r.as_str()) else { continue };
                let text_only = role == "user";
                let content = extract_text_content(msg.get("content").unwrap_or(&serde_json::Value::Null), text_only);
                if content.is_empty() || is_system_reminder(&content) {
                    continue;
                }

                if created_time.is_none() {
                    created_time = value.get("timestamp").and_then(|t| t.as_str()).and_then(parse_rfc3339);
                }

                seen_messages = true;
                match role {
                    "user" => {
                        if first_user_prompt.is_empty() {
                            first_user_prompt = content.clone();
                        }
                        last_user_prompt = content;
                    }
                    "assistant" => last_assistant_response = content,
                    _ => {}
                }
            }
        }

        if !seen_messages {
            return Ok(None);
        }

        let project_path = cwd
            .map(PathBuf::from)
            .unwrap_or_else(|| decode_project_path(project_dir_name));
        let project_name = project_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if !is_subagent {
            if let Some(kind) = claude_view_core::detect_automated_session(&first_user_prompt) {
                is_subagent = true;
                subagent_type = claude_view_core::extract_subagent_type_value(&first_user_prompt)
                    .unwrap_or_else(|| kind.as_str().to_string());
            }
        }

        if title.is_empty() {
            title = "Untitled Session".to_string();
        }

        let mut session = Session::new(session_id, self.name());
        session.project_path = project_path.to_string_lossy().to_string();
        session.project_name = project_name;
        session.title = title;
        session.first_prompt = first_user_prompt.clone();
        session.last_prompt = last_user_prompt;
        session.last_response = last_assistant_response;
        session.created_time = created_time;
        session.modified_time = file_mtime(&path);
        session.is_child = is_subagent;
        session.child_type = subagent_type;
        session.raw_path = path.to_string_lossy().to_string();
        session.file_mtime = file_mtime(&path);
        session.first_prompt_preview = Some(preview(&first_user_prompt, 200));

        Ok(Some(session))
    }

    async fn iter_messages<'a>(&'a self, session_id: &'a str) -> MessageStream<'a> {
        let Some(path) = self.find_session_file(session_id) else {
            return Box::pin(tokio_stream::empty());
        };
        let session_id = session_id.to_string();

        Box::pin(async_stream::stream! {
            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    yield Err(ParseError::io(&path, e));
                    return;
                }
            };
            let mut lines = BufReader::new(file).lines();
            let mut sequence = 0u32;

            loop {
                let next = match lines.next_line().await {
                    Ok(n) => n,
                    Err(e) => {
                        yield Err(ParseError::io(&path, e));
                        return;
                    }
                };
                let Some(line) = next else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: serde_json::Value = match serde_json::from_str(line) {
                    Ok(v) => v,
                    Err(_) => {
                        debug!(%session_id, "skipping malformed JSON line");
                        continue;
                    }
                };
                if value.get("type").and_then(|t| t.as_str()) != Some("message") {
                    continue;
                }
                let Some(msg) = value.get("message") else { continue };
                let Some(role_str) = msg.get("role").and_then(|r| r.as_str()) else { continue };
                let text_only = role_str == "user";
                let content = extract_text_content(msg.get("content").unwrap_or(&serde_json::Value::Null), text_only);
                if content.is_empty() || is_system_reminder(&content) {
                    continue;
                }

                let timestamp = value.get("timestamp").and_then(|t| t.as_str()).and_then(parse_rfc3339);
                let id = format!("{session_id}_{sequence}");

                yield Ok(Message {
                    id,
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
        Some(format!("droid --resume {session_id}"))
    }
}

fn file_mtime(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    modified.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs() as i64)
}

fn parse_rfc3339(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp())
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(idx) if idx > max_chars / 2 => format!("{}...", &truncated[..idx]),
        _ => format!("{truncated}..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_session_start_and_message_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("-Users-dev-demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let session_path = project_dir.join("d1.jsonl");
        let lines = [
            r#"{"type":"session_start","title":"Fix the build","cwd":"/Users/dev/demo"}"#,
            r#"{"type":"message","message":{"role":"user","content":"the build is failing"},"timestamp":"2026-02-01T00:00:00Z"}"#,
            r#"{"type":"message","message":{"role":"assistant","content":"let's check the logs"}}"#,
        ];
        tokio::fs::write(&session_path, lines.join("\n")).await.unwrap();

        let provider = DroidProvider { sessions_dir: Some(tmp.path().to_path_buf()) };
        let session = provider.parse_metadata("d1").await.unwrap().unwrap();
        assert_eq!(session.title, "Fix the build");
        assert_eq!(session.project_path, "/Users/dev/demo");
        assert_eq!(session.first_prompt, "the build is failing");
        assert!(!session.is_child);
    }

    #[tokio::test]
    async fn subagent_title_prefix_marks_child_with_type() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("-Users-dev-demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let session_path = project_dir.join("d2.jsonl");
        let lines = [
            r#"{"type":"session_start","title":"# Task Tool Invocation - Subagent type: code-reviewer","cwd":"/Users/dev/demo"}"#,
            r#"{"type":"message","message":{"role":"user","content":"review this diff"}}"#,
        ];
        tokio::fs::write(&session_path, lines.join("\n")).await.unwrap();

        let provider = DroidProvider { sessions_dir: Some(tmp.path().to_path_buf()) };
        let session = provider.parse_metadata("d2").await.unwrap().unwrap();
        assert!(session.is_child);
        assert_eq!(session.child_type, "code-reviewer");
    }
}
