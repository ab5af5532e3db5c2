//! HTML formatting helpers for Telegram messages.
//!
//! All output uses HTML parse mode (never MarkdownV2).

/// Longest message Telegram accepts, in characters.
pub const TELEGRAM_MAX_CHARS: usize = 4096;

/// Escape special HTML characters in user-provided text.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape `text` and cut it so the escaped result, including a trailing
/// `...` marker, is at most `max_chars` characters. Entities are never split.
pub fn escape_html_truncated(text: &str, max_chars: usize) -> String {
    let escaped = escape_html(text);
    if escaped.chars().count() <= max_chars {
        return escaped;
    }
    let budget = max_chars.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0_usize;
    for c in text.chars() {
        let piece = match c {
            '&' => "&amp;".to_owned(),
            '<' => "&lt;".to_owned(),
            '>' => "&gt;".to_owned(),
            other => other.to_string(),
        };
        let width = piece.chars().count();
        if used.saturating_add(width) > budget {
            break;
        }
        used = used.saturating_add(width);
        out.push_str(&piece);
    }
    out.push_str("...");
    out
}

/// Shorten `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}
