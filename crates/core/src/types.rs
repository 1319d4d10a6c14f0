//! Shared data model: the normalized shape every provider, chunker, tagger,
//! store, and search pass agree on.

use serde::{Deserialize, Serialize};

/// One transcript, normalized from whatever on-disk shape its harness uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub harness: String,
    pub project_path: String,
    pub project_name: String,
    pub title: String,
    pub first_prompt: String,
    pub last_prompt: String,
    pub last_response: String,
    /// Epoch seconds the session started, if the harness records it.
    pub created_time: Option<i64>,
    /// Epoch seconds of the most recent activity in this session.
    pub modified_time: Option<i64>,
    pub is_child: bool,
    pub child_type: String,
    pub parent_id: Option<String>,
    pub message_count: u32,
    pub turn_count: u32,
    /// First 200 chars of `first_prompt`, ellipsized. Computed once at index time.
    pub first_prompt_preview: Option<String>,
    /// Absolute path to the source transcript on disk (JSONL file, sqlite row, etc).
    pub raw_path: String,
    /// mtime of the source file at the time it was last read, epoch seconds.
    pub file_mtime: Option<i64>,
    pub indexed_at: Option<i64>,
    pub auto_tags: Vec<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, harness: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            harness: harness.into(),
            project_path: String::new(),
            project_name: String::new(),
            title: String::new(),
            first_prompt: String::new(),
            last_prompt: String::new(),
            last_response: String::new(),
            created_time: None,
            modified_time: None,
            is_child: false,
            child_type: String::new(),
            parent_id: None,
            message_count: 0,
            turn_count: 0,
            first_prompt_preview: None,
            raw_path: String::new(),
            file_mtime: None,
            indexed_at: None,
            auto_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
            Role::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::Other,
        }
    }
}

/// One turn in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: Option<i64>,
    pub sequence: u32,
    pub has_code: bool,
    /// Normalized `agent-do` tool names mentioned in this message, if any.
    pub tool_mentions: Option<Vec<String>>,
}

impl Message {
    /// `"```" in content || "def " in content || "function " in content` —
    /// the same cheap heuristic the system this was ported from uses.
    pub fn detect_has_code(content: &str) -> bool {
        content.contains("```") || content.contains("def ") || content.contains("function ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Summary,
    Turn,
    ToolUsage,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Summary => "summary",
            ChunkType::Turn => "turn",
            ChunkType::ToolUsage => "tool_usage",
        }
    }
}

/// A searchable unit of session content, the thing embeddings are computed over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Store-assigned row id; `None` until persisted.
    pub id: Option<i64>,
    pub session_id: String,
    pub message_id: Option<String>,
    pub chunk_index: u32,
    pub chunk_type: ChunkType,
    pub content: String,
    /// Opaque structured payload, stored as JSON text.
    pub metadata: serde_json::Value,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
}

/// An externally-generated short description of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub session_id: String,
    pub text: String,
    pub model: String,
    pub content_hash: String,
    pub created_at: i64,
}

/// Staleness fingerprint for a `Summary`: a fast non-cryptographic hash of
/// the content a summary was produced from, truncated to 12 hex chars to
/// match the legacy cache's fingerprint width.
pub fn content_hash(first_prompt: &str, last_response: &str) -> String {
    let truncated_first: String = first_prompt.chars().take(500).collect();
    let truncated_last: String = last_response.chars().take(500).collect();
    let combined = format!("{truncated_first}|{truncated_last}");
    blake3::hash(combined.as_bytes()).to_hex()[..12].to_string()
}

/// Derived counters for one project, recomputed after indexing batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectStats {
    pub project_path: String,
    pub project_name: String,
    pub total_sessions: u32,
    pub parent_sessions: u32,
    pub child_sessions: u32,
    pub first_session_time: Option<i64>,
    pub last_session_time: Option<i64>,
    pub harness_counts: std::collections::HashMap<String, u32>,
    pub total_messages: u32,
    pub common_tags: Vec<String>,
    pub updated_at: i64,
}

/// An append-only record of a search query, for history/diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLogEntry {
    pub query: String,
    pub result_count: u32,
    pub top_session_ids: Vec<String>,
    pub elapsed_ms: u64,
    pub timestamp: i64,
}

/// Filter options for listing sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub harness: Option<String>,
    pub project_path: Option<String>,
    pub is_child: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_code_detects_fence() {
        assert!(Message::detect_has_code("here:\n```rust\nfn x() {}\n```"));
    }

    #[test]
    fn has_code_detects_def_and_function_keywords() {
        assert!(Message::detect_has_code("def foo():\n    pass"));
        assert!(Message::detect_has_code("function foo() {}"));
    }

    #[test]
    fn has_code_false_for_plain_prose() {
        assert!(!Message::detect_has_code("please fix the bug in the login flow"));
    }

    #[test]
    fn role_round_trips() {
        for role in [Role::User, Role::Assistant, Role::System, Role::Tool] {
            assert_eq!(Role::parse(role.as_str()), role);
        }
        assert_eq!(Role::parse("weird"), Role::Other);
    }

    #[test]
    fn content_hash_is_stable_and_twelve_chars() {
        let a = content_hash("fix the login bug", "done, tests pass");
        let b = content_hash("fix the login bug", "done, tests pass");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn content_hash_changes_with_content() {
        let a = content_hash("fix the login bug", "done");
        let b = content_hash("fix the signup bug", "done");
        assert_ne!(a, b);
    }
}
