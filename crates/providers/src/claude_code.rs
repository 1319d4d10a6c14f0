//! Claude Code sessions: `~/.claude/projects/<encoded-project-dir>/<session-id>.jsonl`,
//! one JSON object per line. `isSidechain` is the harness's own authoritative
//! sub-agent flag; textual signature matching only kicks in when it's absent.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use claude_view_core::error::{DiscoveryError, ParseError};
use claude_view_core::provider::{DiscoveredSession, MessageStream, Provider};
use claude_view_core::types::{Message, Role, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::content::{clean_command_tags, extract_text_content, is_system_reminder};
use crate::path_decode::decode_project_path;

pub struct ClaudeCodeProvider {
    sessions_dir: Option<PathBuf>,
}

impl ClaudeCodeProvider {
    pub fn new() -> Self {
        Self {
            sessions_dir: dirs::home_dir().map(|h| h.join(".claude").join("projects")),
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

impl Default for ClaudeCodeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for ClaudeCodeProvider {
    fn name(&self) -> &str {
        "claude-code"
    }

    fn display_name(&self) -> &str {
        "Claude Code"
    }

    fn icon(&self) -> &str {
        "🧠"
    }

    fn color(&self) -> &str {
        "cyan"
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
        let mut is_sidechain = false;
        let mut created_time: Option<i64> = None;
        let mut first_user_prompt = String::new();
        let mut last_user_prompt = String::new();
        let mut last_assistant_response = String::new();
        let mut seen_messages = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else { continue };
            let Some(msg_type) = value.get("type").and_then(|t| t.as_str()) else { continue };

            if msg_type == "user" {
                if cwd.is_none() {
                    cwd = value.get("cwd").and_then(|v| v.as_str()).map(String::from);
                }
                if value.get("isSidechain").and_then(|v| v.as_bool()) == Some(true) {
                    is_sidechain = true;
                }
            }

            if msg_type == "user" || msg_type == "assistant" {
                let Some(msg) = value.get("message") else { continue };
                let Some(role) = msg.get("role").and_then(|r| r.as_str()) else { continue };
                let text_only = role == "user";
                let content = extract_text_content(msg.get("content").unwrap_or(&serde_json::Value::Null), text_only);
                if content.is_empty() || is_system_reminder(&content) {
                    continue;
                }
                let content = if role == "user" { clean_command_tags(&content) } else { content };
                if content.is_empty() {
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

        let (is_child, child_type) = if is_sidechain {
            (true, "sidechain".to_string())
        } else if let Some(kind) = claude_view_core::detect_automated_session(&first_user_prompt) {
            let value = claude_view_core::extract_subagent_type_value(&first_user_prompt);
            (true, value.unwrap_or_else(|| kind.as_str().to_string()))
        } else {
            (false, String::new())
        };

        let title = first_user_prompt
            .lines()
            .next()
            .map(|l| l.trim().chars().take(80).collect::<String>())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "Claude Code Session".to_string());

        let mut session = Session::new(session_id, self.name());
        session.project_path = project_path.to_string_lossy().to_string();
        session.project_name = project_name;
        session.title = title;
        session.first_prompt = first_user_prompt.clone();
        session.last_prompt = last_user_prompt;
        session.last_response = last_assistant_response;
        session.created_time = created_time;
        session.modified_time = file_mtime(&path);
        session.is_child = is_child;
        session.child_type = child_type;
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
                let Some(msg_type) = value.get("type").and_then(|t| t.as_str()) else { continue };
                if msg_type != "user" && msg_type != "assistant" {
                    continue;
                }
                let Some(msg) = value.get("message") else { continue };
                let Some(role_str) = msg.get("role").and_then(|r| r.as_str()) else { continue };
                let text_only = role_str == "user";
                let content = extract_text_content(msg.get("content").unwrap_or(&serde_json::Value::Null), text_only);
                if content.is_empty() || is_system_reminder(&content) {
                    continue;
                }
                let content = if role_str == "user" { clean_command_tags(&content) } else { content };
                if content.is_empty() {
                    continue;
                }

                let timestamp = value.get("timestamp").and_then(|t| t.as_str()).and_then(parse_rfc3339);
                let id = value
                    .get("uuid")
                    .and_then(|u| u.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| format!("{session_id}_{sequence}"));

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
        Some(format!("claude --resume {session_id}"))
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

    #[test]
    fn preview_truncates_at_word_boundary() {
        let text = "the quick brown fox jumps over the lazy dog and keeps running for a while";
        let result = preview(text, 20);
        assert!(result.ends_with("..."));
        assert!(result.len() <= 24);
    }

    #[test]
    fn preview_leaves_short_text_alone() {
        assert_eq!(preview("short", 200), "short");
    }

    #[tokio::test]
    async fn parses_a_simple_session_and_detects_sidechain() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("-Users-dev-demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let session_path = project_dir.join("abc123.jsonl");

        let lines = [
            r#"{"type":"user","message":{"role":"user","content":"please fix the login bug"},"timestamp":"2026-01-01T00:00:00Z","cwd":"/Users/dev/demo","isSidechain":false}"#,
            r#"{"type":"assistant","message":{"role":"assistant","content":"looking into it"}}"#,
        ];
        tokio::fs::write(&session_path, lines.join("\n")).await.unwrap();

        let provider = ClaudeCodeProvider { sessions_dir: Some(tmp.path().to_path_buf()) };
        let session = provider.parse_metadata("abc123").await.unwrap().unwrap();
        assert_eq!(session.project_path, "/Users/dev/demo");
        assert_eq!(session.first_prompt, "please fix the login bug");
        assert_eq!(session.last_response, "looking into it");
        assert!(!session.is_child);
    }

    #[tokio::test]
    async fn sidechain_flag_marks_session_as_child() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("-Users-dev-demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let session_path = project_dir.join("sub1.jsonl");
        let line = r#"{"type":"user","message":{"role":"user","content":"do the subtask"},"cwd":"/Users/dev/demo","isSidechain":true}"#;
        tokio::fs::write(&session_path, line).await.unwrap();

        let provider = ClaudeCodeProvider { sessions_dir: Some(tmp.path().to_path_buf()) };
        let session = provider.parse_metadata("sub1").await.unwrap().unwrap();
        assert!(session.is_child);
        assert_eq!(session.child_type, "sidechain");
    }

    #[tokio::test]
    async fn empty_session_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("-Users-dev-demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let session_path = project_dir.join("empty.jsonl");
        tokio::fs::write(&session_path, "").await.unwrap();

        let provider = ClaudeCodeProvider { sessions_dir: Some(tmp.path().to_path_buf()) };
        assert!(provider.parse_metadata("empty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn iter_messages_yields_in_order_and_cleans_command_tags() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("-Users-dev-demo");
        std::fs::create_dir_all(&project_dir).unwrap();
        let session_path = project_dir.join("ord1.jsonl");
        let lines = [
            r#"{"type":"user","message":{"role":"user","content":"<command-name>/review</command-name>\n<command-args>PR 1</command-args>"},"uuid":"u1"}"#,
            r#"{"type":"assistant","message":{"role":"assistant","content":"sure, reviewing"},"uuid":"a1"}"#,
        ];
        tokio::fs::write(&session_path, lines.join("\n")).await.unwrap();

        let provider = ClaudeCodeProvider { sessions_dir: Some(tmp.path().to_path_buf()) };
        use tokio_stream::StreamExt;
        let mut stream = provider.iter_messages("ord1").await;
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.content, "PR 1");
        assert_eq!(first.sequence, 0);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.content, "sure, reviewing");
        assert_eq!(second.sequence, 1);
        assert!(stream.next().await.is_none());
    }
}
