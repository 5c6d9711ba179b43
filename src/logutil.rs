//! Logging helpers for user-supplied labels (usernames, habit and pet names) so log lines stay
//! single-line and bounded.

const MAX_LABEL_PREVIEW: usize = 60;

/// Escape a label for single-line logging:
/// - `\n` => `\\n`, `\r` => `\\r`, `\t` => `\\t`
/// - other control characters as `\xNN`
/// - labels longer than 60 characters are cut with an ellipsis
pub fn log_label(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_LABEL_PREVIEW) + 2);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_LABEL_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
