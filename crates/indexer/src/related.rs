//! Read-time heuristic matching of orphaned children to a parent session:
//! same project path, same harness, within a temporal proximity window.
//!
//! The window is widened for harnesses whose sub-agents can run
//! unattended for a long stretch (OpenCode: 24h) and otherwise 2h. This
//! is deliberately a join performed when a caller asks for a parent's
//! children, not something baked into a session's stored `parent_id` at
//! index time.

use std::time::Duration;

use claude_view_core::types::Session;

/// Default orphan-matching time window when a provider doesn't override it.
pub const DEFAULT_ORPHAN_WINDOW: Duration = Duration::from_secs(2 * 3600);

/// Combine a parent's explicitly linked children (`parent_id` set, by the
/// provider or self-healed by a later safe-linkage pass) with orphan
/// candidates that merely share project path and harness within `window`
/// of the parent's modified time. Deduplicated by session id, sorted by
/// `created_time` (falling back to `modified_time`) ascending, matching the
/// original's `sort(key=lambda s: s.created_time or s.modified_time)`.
pub fn merge_children(
    parent: &Session,
    linked: Vec<Session>,
    orphan_candidates: Vec<Session>,
    window: Duration,
) -> Vec<Session> {
    let mut seen: std::collections::HashSet<String> = linked.iter().map(|s| s.id.clone()).collect();
    let mut related = linked;

    if let Some(parent_time) = parent.modified_time {
        let window_secs = window.as_secs() as i64;
        for child in orphan_candidates {
            if seen.contains(&child.id) {
                continue;
            }
            let child_time = child.modified_time.or(child.created_time);
            let Some(child_time) = child_time else { continue };
            if (child_time - parent_time).abs() < window_secs {
                seen.insert(child.id.clone());
                related.push(child);
            }
        }
    }

    related.sort_by_key(|s| s.created_time.or(s.modified_time).unwrap_or(i64::MAX));
    related
}
