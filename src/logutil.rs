//! Helpers that keep radio text and raw bytes readable in single-line log records.
use std::fmt::Write;

/// Longest preview [`escape_log`] emits before cutting off with an ellipsis.
pub const MAX_PREVIEW_CHARS: usize = 300;

/// Escape newlines, tabs, backslashes and other control characters so a message from the
/// mesh or the pipe cannot split a log record. Output is capped at [`MAX_PREVIEW_CHARS`].
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW_CHARS) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW_CHARS {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape and cut to at most `max_bytes` of input, never inside a UTF-8 sequence.
pub fn truncate_for_log(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return escape_log(input);
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = escape_log(&input[..cut]);
    out.push_str("...");
    out
}

/// Lowercase hex of the first `max` bytes.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(max.min(data.len()) * 2);
    for b in data.iter().take(max) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("Line1\nLine2\r\tEnd"), "Line1\\nLine2\\r\\tEnd");
        assert_eq!(escape_log("a\u{7}b\\"), "a\\x07b\\\\");
    }

    #[test]
    fn long_text_is_capped() {
        let long = "x".repeat(MAX_PREVIEW_CHARS + 10);
        let esc = escape_log(&long);
        assert!(esc.ends_with('…'));
        assert_eq!(esc.chars().count(), MAX_PREVIEW_CHARS + 1);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // "—" is three bytes; a naive cut at 7 would land inside it
        assert_eq!(truncate_for_log("12345—7890", 10), "12345...");
        assert_eq!(truncate_for_log("hello", 10), "hello");
    }

    #[test]
    fn hex_snippet_limits_output() {
        assert_eq!(hex_snippet(&[0x94, 0xc3, 0x00, 0x05], 2), "94c3");
        assert_eq!(hex_snippet(&[], 8), "");
    }
}
