//! Concrete `Provider` implementations, one per AI coding harness.

mod content;
mod path_decode;

pub mod claude_code;
pub mod cursor;
pub mod droid;
pub mod opencode;

use claude_view_core::provider::Provider;

/// The harnesses this crate knows how to read, in the order they're checked
/// during discovery. Each is independently available or not depending on
/// whether its data directory exists on the running machine.
pub fn default_providers() -> Vec<Box<dyn Provider>> {
    vec![
        Box::new(claude_code::ClaudeCodeProvider::new()),
        Box::new(droid::DroidProvider::new()),
        Box::new(cursor::CursorProvider::new()),
        Box::new(opencode::OpenCodeProvider::new()),
    ]
}
