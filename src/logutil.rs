//! Logging helpers for caller-supplied labels (experience sources, skill and
//! stat names) so a hostile or sloppy caller cannot split or flood log lines.

use std::fmt::Write;

const MAX_PREVIEW: usize = 120;

/// Escape control characters and cap the length of a label before logging it.
///
/// Newlines, carriage returns and tabs become their backslash escapes, other
/// control characters become `\xNN`, and anything past the preview length is
/// replaced by an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 4);
    for (idx, ch) in s.chars().enumerate() {
        if idx == MAX_PREVIEW {
            out.push('…');
            break;
        }
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
    out
}
