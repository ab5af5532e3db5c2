//! Tests for `src/telegram/commands.rs` — reply texts.

use chrono::{TimeZone, Utc};
use mailwizard::schedule::{EmailStatus, ScheduledEmail};
use mailwizard::telegram::commands::{
    format_scheduled, format_scheduled_plain, handle_help, handle_start, schedule_confirmation,
    sent_confirmation,
};

fn row(id: i64, send_at: &str, status: EmailStatus) -> ScheduledEmail {
    ScheduledEmail {
        id,
        chat_id: 1,
        recipients: "a@x.com, b@x.com".to_owned(),
        subject: "Weekly <update>".to_owned(),
        body: "body".to_owned(),
        attachments: Vec::new(),
        send_at: send_at.to_owned(),
        status,
        created_at: "2030-01-01T00:00:00.000000Z".to_owned(),
    }
}

#[test]
fn start_points_to_sendmail() {
    assert!(handle_start().contains("/sendmail"));
}

#[test]
fn help_mentions_the_time_format() {
    assert!(handle_help().contains("YYYY-MM-DD HH:MM"));
}

#[test]
fn sent_confirmation_counts_recipients() {
    assert_eq!(sent_confirmation(1), "✅ Email sent!");
    assert!(sent_confirmation(3).contains("3 recipients"));
}

#[test]
fn scheduled_listing_shows_id_time_and_status() {
    let text = format_scheduled(&[
        row(2, "2099-02-01 00:00", EmailStatus::Pending),
        row(1, "2099-01-01 00:00", EmailStatus::Sent),
    ]);
    assert!(text.starts_with("<b>Scheduled emails (2):</b>"));
    assert!(text.contains("ID:2"));
    assert!(text.contains("2099-02-01 00:00"));
    assert!(text.contains("<i>sent</i>"));
}

#[test]
fn long_recipient_lists_are_truncated_in_listing() {
    let mut long = row(1, "x", EmailStatus::Pending);
    long.recipients = "someone@example.com, ".repeat(10);
    let text = format_scheduled(&[long]);
    assert!(text.contains("..."));
}

#[test]
fn plain_listing_is_tab_separated() {
    let text = format_scheduled_plain(&[row(5, "2099-01-01 00:00", EmailStatus::Pending)]);
    assert_eq!(
        text,
        "5\tpending\t2099-01-01 00:00\ta@x.com, b@x.com\tWeekly <update>"
    );
}

#[test]
fn confirmation_escapes_unreadable_time() {
    let now = Utc
        .with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp");
    let text = schedule_confirmation(4, "<soon>", None, now);
    assert!(text.contains("&lt;soon&gt;"));
    assert!(text.contains("ID 4"));
}
