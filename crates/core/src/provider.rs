//! The `Provider` trait — one implementation per AI coding harness.
//!
//! Generalizes the per-harness adapter shape: identity, discovery, parsing,
//! and a lazy message stream. Concrete harnesses live in `claude-view-providers`;
//! this crate only owns the contract so `claude-view-indexer` and
//! `claude-view-search` can depend on it without depending on every harness.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::{DiscoveryError, ParseError};
use crate::types::{Message, Session};

/// One session id paired with the mtime of its backing artifact, as reported
/// by a provider's discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSession {
    pub session_id: String,
    pub mtime: i64,
}

/// A pinned, boxed async stream of messages, in chronological order.
pub type MessageStream<'a> =
    std::pin::Pin<Box<dyn Stream<Item = Result<Message, ParseError>> + Send + 'a>>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Short, stable identifier, e.g. `"claude-code"`.
    fn name(&self) -> &str;

    /// Human-facing label, e.g. `"Claude Code"`.
    fn display_name(&self) -> &str;

    /// Glyph shown next to this provider's sessions in a UI, e.g. `"🧠"`.
    fn icon(&self) -> &str {
        ""
    }

    /// Accent color name shown next to this provider's sessions, e.g. `"cyan"`.
    fn color(&self) -> &str {
        ""
    }

    /// Whether this provider's `discover()` is cheap enough to run on every
    /// poll (a directory listing) versus only on a full reindex (a database
    /// query or a per-session subtree walk). See `discover_sessions_fast`
    /// in the reference implementation this was generalized from.
    fn fast_discovery(&self) -> bool {
        true
    }

    /// Widened orphan-matching window for this provider's children, if its
    /// sub-agent sessions can run unattended for a long time. `None` means
    /// use the global default (2 hours).
    fn long_running_child_window(&self) -> Option<Duration> {
        None
    }

    /// Root directory this provider reads from (may not exist).
    fn sessions_root(&self) -> Option<PathBuf>;

    /// Whether `sessions_root()` exists and can be read.
    fn is_available(&self) -> bool {
        self.sessions_root().is_some_and(|p| p.exists())
    }

    /// Enumerate every session this provider currently knows about, with
    /// modification times, for incremental-update comparison.
    async fn discover(&self) -> Result<Vec<DiscoveredSession>, DiscoveryError>;

    /// Parse one session's metadata (without loading its full message body).
    async fn parse_metadata(&self, session_id: &str) -> Result<Option<Session>, ParseError>;

    /// Lazily stream a session's messages in chronological order.
    async fn iter_messages<'a>(&'a self, session_id: &'a str) -> MessageStream<'a>;

    /// Shell command a UI can run to resume this session, if the harness
    /// supports resuming.
    fn resume_command(&self, _session_id: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;

    #[async_trait]
    impl Provider for Stub {
        fn name(&self) -> &str {
            "stub"
        }
        fn display_name(&self) -> &str {
            "Stub"
        }
        fn sessions_root(&self) -> Option<PathBuf> {
            None
        }
        async fn discover(&self) -> Result<Vec<DiscoveredSession>, DiscoveryError> {
            Ok(vec![])
        }
        async fn parse_metadata(&self, _session_id: &str) -> Result<Option<Session>, ParseError> {
            Ok(None)
        }
        async fn iter_messages<'a>(&'a self, _session_id: &'a str) -> MessageStream<'a> {
            Box::pin(tokio_stream::empty())
        }
    }

    #[test]
    fn defaults_are_sane() {
        let stub = Stub;
        assert!(stub.fast_discovery());
        assert!(stub.long_running_child_window().is_none());
        assert!(!stub.is_available());
        assert!(stub.resume_command("s1").is_none());
    }
}
