//! Shared types, error kinds, path helpers, the `Provider` trait, and the
//! cross-harness automated-session detector. Every other crate in this
//! workspace depends on this one; this one depends on nothing internal.

pub mod automation;
pub mod error;
pub mod paths;
pub mod provider;
pub mod types;

pub use automation::{detect_automated_session, extract_subagent_type_value, AutomationKind};
pub use error::{DiscoveryError, ParseError};
pub use provider::{DiscoveredSession, MessageStream, Provider};
pub use types::*;
