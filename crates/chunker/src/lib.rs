//! Splits a parsed session into summary, turn, and tool-usage chunks.
//!
//! Pure function of `(Session, [Message])` — no I/O, no time dependency, no
//! randomness. Grounded directly on the turn-chunking and tool-mention
//! extraction rules of the system this was ported from: 400-estimated-token
//! turn packing that respects message boundaries, and an `agent-do <tool>`
//! pattern that gets its own dedicated chunk with +/-200 characters of
//! surrounding context.

use claude_view_core::types::{Chunk, ChunkType, Message, Session};
use regex_lite::Regex;
use serde_json::json;
use std::sync::OnceLock;

const TARGET_TOKENS: usize = 400;
const SUMMARY_PREVIEW_CHARS: usize = 200;

fn agent_do_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"agent-do\s+(\S+)(?:\s+(.+?))?(?:\n|$)").unwrap())
}

/// `chars / 4` — a rough, fast token estimate, not a real tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Distinct `agent-do <tool>` names mentioned anywhere in `messages`, sorted.
pub fn extract_tool_mentions(messages: &[Message]) -> Vec<String> {
    let mut tools = std::collections::BTreeSet::new();
    for msg in messages {
        for caps in agent_do_pattern().captures_iter(&msg.content) {
            if let Some(tool) = caps.get(1) {
                tools.insert(tool.as_str().to_string());
            }
        }
    }
    tools.into_iter().collect()
}

fn truncate_preview(content: &str) -> String {
    let char_count = content.chars().count();
    if char_count > SUMMARY_PREVIEW_CHARS {
        let mut s: String = content.chars().take(SUMMARY_PREVIEW_CHARS).collect();
        s.push_str("...");
        s
    } else {
        content.to_string()
    }
}

fn create_summary_chunk(session: &Session, messages: &[Message], chunk_index: u32) -> Chunk {
    let first_prompt = messages
        .iter()
        .find(|m| m.role == claude_view_core::types::Role::User && !m.content.trim().is_empty())
        .map(|m| truncate_preview(&m.content));

    let tools = extract_tool_mentions(messages);

    let mut parts = vec![
        format!("Project: {}", session.project_name),
        format!("Path: {}", session.project_path),
    ];
    if !session.title.is_empty() {
        parts.push(format!("Title: {}", session.title));
    }
    if let Some(prompt) = &first_prompt {
        if !prompt.is_empty() {
            parts.push(format!("First prompt: {prompt}"));
        }
    }
    if !tools.is_empty() {
        parts.push(format!("Tools used: {}", tools.join(", ")));
    }

    let metadata = json!({
        "chunk_type": "summary",
        "session_id": session.id,
        "project_name": session.project_name,
        "harness": session.harness,
        "tools": tools,
    });

    Chunk {
        id: None,
        session_id: session.id.clone(),
        message_id: None,
        chunk_index,
        chunk_type: ChunkType::Summary,
        content: parts.join("\n"),
        metadata,
        embedding: None,
        embedding_model: None,
    }
}

fn create_turn_chunks(session: &Session, messages: &[Message], start_index: u32) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_index = start_index;

    let mut current_messages: Vec<String> = Vec::new();
    let mut current_ids: Vec<Option<String>> = Vec::new();
    let mut current_tokens: usize = 0;

    let flush = |chunks: &mut Vec<Chunk>,
                 chunk_index: &mut u32,
                 current_messages: &mut Vec<String>,
                 current_ids: &mut Vec<Option<String>>,
                 current_tokens: &mut usize| {
        if current_messages.is_empty() {
            return;
        }
        let content = current_messages.join("\n\n");
        let message_id = current_ids.first().cloned().flatten();
        let metadata = json!({
            "chunk_type": "turn",
            "session_id": session.id,
            "message_ids": current_ids,
            "token_count": *current_tokens,
        });
        chunks.push(Chunk {
            id: None,
            session_id: session.id.clone(),
            message_id,
            chunk_index: *chunk_index,
            chunk_type: ChunkType::Turn,
            content,
            metadata,
            embedding: None,
            embedding_model: None,
        });
        *chunk_index += 1;
        current_messages.clear();
        current_ids.clear();
        *current_tokens = 0;
    };

    for msg in messages {
        let formatted = format!("[{}]: {}", msg.role.as_str(), msg.content);
        let msg_tokens = estimate_tokens(&formatted);

        if current_tokens + msg_tokens > TARGET_TOKENS && !current_messages.is_empty() {
            flush(
                &mut chunks,
                &mut chunk_index,
                &mut current_messages,
                &mut current_ids,
                &mut current_tokens,
            );
            current_messages.push(formatted);
            current_ids.push(Some(msg.id.clone()));
            current_tokens = msg_tokens;
        } else {
            current_messages.push(formatted);
            current_ids.push(Some(msg.id.clone()));
            current_tokens += msg_tokens;
        }
    }
    flush(
        &mut chunks,
        &mut chunk_index,
        &mut current_messages,
        &mut current_ids,
        &mut current_tokens,
    );

    chunks
}

fn create_tool_usage_chunks(session: &Session, messages: &[Message], start_index: u32) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_index = start_index;

    for msg in messages {
        for caps in agent_do_pattern().captures_iter(&msg.content) {
            let whole = caps.get(0).unwrap();
            let tool = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let command = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

            let start = whole.start().saturating_sub(200);
            let end = (whole.end() + 200).min(msg.content.len());
            let context = safe_slice(&msg.content, start, end).trim().to_string();

            let mut content = format!("Tool: agent-do {tool}\n");
            if !command.is_empty() {
                content.push_str(&format!("Command: {command}\n"));
            }
            content.push_str(&format!("Context: {context}"));

            let metadata = json!({
                "chunk_type": "tool_usage",
                "session_id": session.id,
                "message_id": msg.id,
                "tool": format!("agent-do-{tool}"),
                "command": command,
            });

            chunks.push(Chunk {
                id: None,
                session_id: session.id.clone(),
                message_id: Some(msg.id.clone()),
                chunk_index,
                chunk_type: ChunkType::ToolUsage,
                content,
                metadata,
                embedding: None,
                embedding_model: None,
            });
            chunk_index += 1;
        }
    }

    chunks
}

/// Slice `s` on byte indices, snapping inward to the nearest char boundary
/// rather than panicking on a multi-byte split.
fn safe_slice(s: &str, mut start: usize, mut end: usize) -> &str {
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    while end > start && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[start..end]
}

/// Chunk a session into searchable segments: one summary chunk (always
/// first), then turn chunks, then tool-usage chunks — all with contiguous
/// indices in that emission order.
pub fn chunk_session(session: &Session, messages: &[Message]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_index = 0;

    chunks.push(create_summary_chunk(session, messages, chunk_index));
    chunk_index += 1;

    let turn_chunks = create_turn_chunks(session, messages, chunk_index);
    chunk_index += turn_chunks.len() as u32;
    chunks.extend(turn_chunks);

    let tool_chunks = create_tool_usage_chunks(session, messages, chunk_index);
    chunks.extend(tool_chunks);

    chunks
}
