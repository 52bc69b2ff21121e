//! Keeps persisted free text on one log line.
//!
//! Item text and the space-separated token columns of item rows come straight
//! from storage and may hold anything. Before they reach a log line they are
//! escaped and clipped.

use std::fmt::Write;

/// Characters kept before a preview is clipped.
pub const DEFAULT_PREVIEW: usize = 120;

/// Escape `s` for a single log line, clipped to [`DEFAULT_PREVIEW`] characters.
pub fn escape_log(s: &str) -> String {
    escape_log_with_limit(s, DEFAULT_PREVIEW)
}

/// Escape backslashes, line breaks, tabs and other control characters, then
/// clip to `limit` source characters with a trailing ellipsis.
pub fn escape_log_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 4);
    let mut chars = s.chars();
    for ch in chars.by_ref().take(limit) {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    if chars.next().is_some() {
        out.push('…');
    }
    out
}
