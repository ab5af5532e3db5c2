//! Telegram slash command handlers and reply texts.
//!
//! Each function returns an HTML-formatted response string. All output uses
//! HTML parse mode.

use chrono::{DateTime, Utc};

use crate::schedule::ScheduledEmail;
use crate::telegram::ui::{escape_html, truncate_chars};

/// Longest recipient list shown per line in `/scheduled`.
const RECIPIENTS_DISPLAY_CHARS: usize = 60;

/// Greeting for `/start`.
pub fn handle_start() -> String {
    [
        "👋 <b>Hi! I'm your mail assistant.</b>",
        "",
        "I can send emails for you, right now or at a time you choose.",
        "Use /sendmail to start composing, or /help to see everything I can do.",
    ]
    .join("\n")
}

/// List all available commands.
pub fn handle_help() -> String {
    [
        "<b>Available commands:</b>",
        "",
        "/sendmail — compose a new email step by step",
        "/scheduled — list your scheduled emails",
        "/cancel — abandon the email you are composing",
        "/help — show this message",
        "",
        "At the last step, type <code>now</code> to send immediately or a time \
         such as <code>2030-05-01 09:30</code> (YYYY-MM-DD HH:MM) to schedule.",
    ]
    .join("\n")
}

/// Reply for `/cancel`.
pub fn handle_cancel(had_session: bool) -> String {
    if had_session {
        "✅ Session cancelled.".to_owned()
    } else {
        "No active session to cancel.".to_owned()
    }
}

/// Reply after an immediate send succeeded.
pub fn sent_confirmation(recipients: usize) -> String {
    if recipients == 1 {
        "✅ Email sent!".to_owned()
    } else {
        format!("✅ Email sent to {recipients} recipients!")
    }
}

/// Render scheduled emails for `/scheduled` (HTML).
pub fn format_scheduled(rows: &[ScheduledEmail]) -> String {
    if rows.is_empty() {
        return "No scheduled emails found.".to_owned();
    }

    let mut lines = vec![format!("<b>Scheduled emails ({}):</b>", rows.len())];
    for row in rows {
        lines.push(format!(
            "ID:{id} — to: {to} — at: {at} — <i>{status}</i>",
            id = row.id,
            to = escape_html(&truncate_chars(&row.recipients, RECIPIENTS_DISPLAY_CHARS)),
            at = escape_html(&row.send_at),
            status = row.status.as_str(),
        ));
    }
    lines.join("\n")
}

/// Render scheduled emails as plain text for the terminal.
pub fn format_scheduled_plain(rows: &[ScheduledEmail]) -> String {
    if rows.is_empty() {
        return "No scheduled emails found.".to_owned();
    }
    rows.iter()
        .map(|row| {
            format!(
                "{id}\t{status}\t{at}\t{to}\t{subject}",
                id = row.id,
                status = row.status.as_str(),
                at = row.send_at,
                to = row.recipients,
                subject = row.subject,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reply after a scheduled email was stored.
///
/// `due` is the parsed send time, or `None` when `raw` could not be read.
/// The record is stored either way.
pub fn schedule_confirmation(
    id: i64,
    raw: &str,
    due: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    match due {
        Some(due) if due <= now => format!(
            "⏰ Scheduled (ID {id}). {when} is already past, so it goes out on the next check.",
            when = due.format("%Y-%m-%d %H:%M UTC"),
        ),
        Some(due) => format!(
            "⏰ Scheduled (ID {id}) for {when}.",
            when = due.format("%Y-%m-%d %H:%M UTC"),
        ),
        None => format!(
            "⚠️ Saved as ID {id}, but I could not read the time <code>{raw}</code>. \
             It will stay pending and will not be sent. Use <code>YYYY-MM-DD HH:MM</code> \
             or an RFC 3339 timestamp and schedule it again.",
            raw = escape_html(raw),
        ),
    }
}
