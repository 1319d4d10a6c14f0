//! Cross-harness detection of automated / sub-agent sessions.
//!
//! Generalized from the handful of textual signatures that show up on the
//! first user prompt of a session a human didn't directly type: structured
//! system content, bracketed directives, CI/bot dispatch phrases, and
//! sub-agent continuation boilerplate. Deliberately excludes anything that
//! looks like one organization's private orchestration tooling naming
//! convention — only the generic, harness-portable signature classes below
//! are recognized.

/// The recognized classes of non-human-authored first prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationKind {
    SystemNotification,
    CommandMessage,
    CommandInstruction,
    CommandCaveat,
    SearchMode,
    AnalyzeMode,
    SystemDirective,
    CompactionContext,
    CiDispatch,
    SubagentContinuation,
    WorkerPrompt,
    Subagent,
}

impl AutomationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationKind::SystemNotification => "system-notification",
            AutomationKind::CommandMessage => "command-message",
            AutomationKind::CommandInstruction => "command-instruction",
            AutomationKind::CommandCaveat => "command-caveat",
            AutomationKind::SearchMode => "search-mode",
            AutomationKind::AnalyzeMode => "analyze-mode",
            AutomationKind::SystemDirective => "system-directive",
            AutomationKind::CompactionContext => "compaction-context",
            AutomationKind::CiDispatch => "ci-dispatch",
            AutomationKind::SubagentContinuation => "subagent-continuation",
            AutomationKind::WorkerPrompt => "worker",
            AutomationKind::Subagent => "task-subagent",
        }
    }
}

const BOT_DISPATCH_PHRASES: &[&str] = &["dispatched by", "scheduled job:", "automated run:"];

/// Inspect the first user prompt of a session and classify it as automated
/// or not. Only looks at the first 500 characters, matching every harness's
/// own heuristic (prompts are cheap to mis-detect past that point; the
/// signature always appears at the very start).
pub fn detect_automated_session(first_prompt: &str) -> Option<AutomationKind> {
    let trimmed = first_prompt.trim();
    if trimmed.is_empty() {
        return None;
    }
    let window: String = trimmed.chars().take(500).collect();
    let lower = window.to_lowercase();

    let xml_prefixes: &[(&str, AutomationKind)] = &[
        ("<system-notification>", AutomationKind::SystemNotification),
        ("<command-message>", AutomationKind::CommandMessage),
        ("<command-instruction>", AutomationKind::CommandInstruction),
        ("<local-command-caveat>", AutomationKind::CommandCaveat),
    ];
    for (prefix, kind) in xml_prefixes {
        if window.starts_with(prefix) {
            return Some(*kind);
        }
    }

    let bracket_prefixes: &[(&str, AutomationKind)] = &[
        ("[search-mode]", AutomationKind::SearchMode),
        ("[analyze-mode]", AutomationKind::AnalyzeMode),
        ("[SYSTEM DIRECTIVE", AutomationKind::SystemDirective),
        ("[COMPACTION CONTEXT", AutomationKind::CompactionContext),
    ];
    for (prefix, kind) in bracket_prefixes {
        if window.starts_with(prefix) {
            return Some(*kind);
        }
    }

    if BOT_DISPATCH_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(AutomationKind::CiDispatch);
    }

    if lower.starts_with("summarize the task tool output above") {
        return Some(AutomationKind::SubagentContinuation);
    }

    if window.starts_with("# Worker Prompt") {
        return Some(AutomationKind::WorkerPrompt);
    }

    if let Some(value) = extract_subagent_type(&window) {
        return Some(value);
    }

    None
}

/// A structured `subagent_type: <value>` field anywhere in the window. The
/// kind is always `Subagent`; the extracted value itself is the caller's
/// concern (child_type), not encoded in this enum.
fn extract_subagent_type(window: &str) -> Option<AutomationKind> {
    let lower = window.to_lowercase();
    if lower.contains("subagent_type") {
        Some(AutomationKind::Subagent)
    } else {
        None
    }
}

/// Extract the literal value bound to `subagent_type` in the window, if any,
/// e.g. `subagent_type: "code-reviewer"` -> `Some("code-reviewer")`.
pub fn extract_subagent_type_value(first_prompt: &str) -> Option<String> {
    let window: String = first_prompt.trim().chars().take(500).collect();
    let idx = window.to_lowercase().find("subagent_type")?;
    let rest = &window[idx + "subagent_type".len()..];
    let rest = rest.trim_start_matches([':', '"', ' ', '\'']);
    let value: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
