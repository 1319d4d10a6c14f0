//! Content extraction shared by the Claude Code and Droid JSONL formats —
//! both represent message content as either a plain string or a list of
//! typed blocks (`text`, `tool_result`, ...).

use regex_lite::Regex;
use std::sync::OnceLock;

/// Flatten a message's `content` field to plain text. `text_only` drops
/// `tool_result` blocks (used for user messages, where tool output is
/// redundant with the assistant message that triggered it).
pub fn extract_text_content(content: &serde_json::Value, text_only: bool) -> String {
    match content {
        serde_json::Value::String(s) => {
            if s.trim_start().starts_with("<system-reminder>") {
                String::new()
            } else {
                s.clone()
            }
        }
        serde_json::Value::Array(items) => {
            let mut parts = Vec::new();
            for item in items {
                let Some(obj) = item.as_object() else {
                    if let Some(s) = item.as_str() {
                        parts.push(s.to_string());
                    }
                    continue;
                };
                match obj.get("type").and_then(|t| t.as_str()) {
                    Some("text") => {
                        if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                            if !text.trim_start().starts_with("<system-reminder>") {
                                parts.push(text.to_string());
                            }
                        }
                    }
                    Some("tool_result") if !text_only => {
                        let raw = obj.get("content").map(value_to_short_string).unwrap_or_default();
                        parts.push(format!("(tool_result: {raw}...)"));
                    }
                    _ => {}
                }
            }
            parts.join(" ")
        }
        other => other.to_string(),
    }
}

fn value_to_short_string(value: &serde_json::Value) -> String {
    let s = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    s.chars().take(50).collect()
}

/// `true` if the text starts (ignoring leading whitespace) with a
/// `<system-reminder>` tag within the first 100 characters — the window
/// every harness uses before giving up on a cheap prefix check.
pub fn is_system_reminder(content: &str) -> bool {
    let window: String = content.chars().take(100).collect();
    window.contains("<system-reminder>")
}

fn command_regexes() -> &'static (Regex, Regex, Regex) {
    static REGEXES: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    REGEXES.get_or_init(|| {
        (
            Regex::new(r"(?s)<command-name>.*?</command-name>\s*").unwrap(),
            Regex::new(r"(?s)<command-args>(.*?)</command-args>").unwrap(),
            Regex::new(r"(?s)<command-message>.*?</command-message>\s*").unwrap(),
        )
    })
}

/// Strip Claude Code's slash-command scaffolding from a user message. When
/// `<command-args>` is present its inner text becomes the message;
/// otherwise the `<command-name>`/`<command-message>` tags are stripped and
/// whatever's left is used.
pub fn clean_command_tags(content: &str) -> String {
    let (name_re, args_re, message_re) = command_regexes();

    if let Some(caps) = args_re.captures(content) {
        if let Some(args) = caps.get(1) {
            let extracted = args.as_str().trim();
            if !extracted.is_empty() {
                return extracted.to_string();
            }
        }
    }

    let cleaned = name_re.replace_all(content, "");
    let cleaned = message_re.replace_all(&cleaned, "");
    cleaned.trim().replace("\\\n", "\n")
}
