//! Tests for `src/schedule/mod.rs` — the SQLite scheduled-send store.

use std::path::PathBuf;

use mailwizard::compose::{EmailSession, SendTime};
use mailwizard::mail::StoredAttachment;
use mailwizard::schedule::{self, EmailStatus, NewScheduledEmail, ScheduleStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

async fn memory_store() -> ScheduleStore {
    let opts = SqliteConnectOptions::new().filename(":memory:");
    // In-memory databases are per-connection, so limit to 1 connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("in-memory pool should connect");
    schedule::migrate(&pool).await.expect("migration applies");
    ScheduleStore::new(pool)
}

fn email(chat_id: i64, send_at: &str) -> NewScheduledEmail {
    NewScheduledEmail {
        chat_id,
        recipients: "a@x.com, b@x.com".to_owned(),
        subject: "Subject".to_owned(),
        body: "Body".to_owned(),
        attachments: Vec::new(),
        send_at: send_at.to_owned(),
    }
}

#[tokio::test]
async fn migration_is_idempotent() {
    let store = memory_store().await;
    schedule::migrate(store.pool())
        .await
        .expect("second migration applies");
}

#[tokio::test]
async fn insert_stores_a_pending_row_verbatim() {
    let store = memory_store().await;
    let attachment = StoredAttachment {
        name: "r.pdf".to_owned(),
        path: PathBuf::from("attachments/7/r.pdf"),
    };
    let mut new = email(7, "not a time at all");
    new.attachments.push(attachment.clone());

    let id = store.insert(new).await.expect("insert");
    let rows = store.list_by_chat(7, 20).await.expect("list");

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.id, id);
    assert_eq!(row.send_at, "not a time at all");
    assert_eq!(row.status, EmailStatus::Pending);
    assert_eq!(row.attachments, vec![attachment]);
    assert!(!row.created_at.is_empty());
}

#[tokio::test]
async fn list_by_chat_is_newest_first_limited_and_scoped() {
    let store = memory_store().await;
    let mut ids = Vec::new();
    for n in 0..25 {
        ids.push(
            store
                .insert(email(1, &format!("2099-01-01 00:{n:02}")))
                .await
                .expect("insert"),
        );
    }
    store.insert(email(2, "2099-01-01 00:00")).await.expect("insert");

    let rows = store.list_by_chat(1, 20).await.expect("list");
    assert_eq!(rows.len(), 20);
    assert!(rows.iter().all(|r| r.chat_id == 1));

    let newest: Vec<i64> = ids.iter().rev().take(20).copied().collect();
    let listed: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(listed, newest);

    assert!(store.list_by_chat(3, 20).await.expect("list").is_empty());
}

#[tokio::test]
async fn list_pending_is_oldest_first_and_mark_sent_is_one_way() {
    let store = memory_store().await;
    let first = store.insert(email(1, "a")).await.expect("insert");
    let second = store.insert(email(2, "b")).await.expect("insert");

    let guard = store.lock().await;
    let pending: Vec<i64> = guard
        .list_pending()
        .await
        .expect("pending")
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(pending, vec![first, second]);

    guard.mark_sent(first).await.expect("mark");
    guard.mark_sent(first).await.expect("mark twice is harmless");
    let pending: Vec<i64> = guard
        .list_pending()
        .await
        .expect("pending")
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(pending, vec![second]);
    drop(guard);

    let rows = store.list_by_chat(1, 20).await.expect("list");
    assert_eq!(rows[0].status, EmailStatus::Sent);
}

#[tokio::test]
async fn corrupt_row_is_skipped_without_hiding_the_rest() {
    let store = memory_store().await;
    let broken = store.insert(email(1, "a")).await.expect("insert");
    let healthy = store.insert(email(1, "b")).await.expect("insert");
    sqlx::query("UPDATE scheduled_emails SET attachments_json = 'not json' WHERE id = ?1")
        .bind(broken)
        .execute(store.pool())
        .await
        .expect("corrupt row");

    let guard = store.lock().await;
    let pending = guard.list_pending().await.expect("scan survives");
    assert_eq!(pending.iter().map(|r| r.id).collect::<Vec<_>>(), vec![healthy]);
    drop(guard);

    let listed = store.list_by_chat(1, 20).await.expect("list survives");
    assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![healthy]);
}

#[tokio::test]
async fn rows_survive_reopening_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("botdata.db");

    {
        let pool = schedule::open_pool(&path).await.expect("open");
        let store = ScheduleStore::new(pool.clone());
        store.insert(email(9, "2099-01-01 00:00")).await.expect("insert");
        pool.close().await;
    }

    let store = ScheduleStore::new(schedule::open_pool(&path).await.expect("reopen"));
    let rows = store.list_by_chat(9, 20).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recipients, "a@x.com, b@x.com");
}

#[test]
fn only_timed_sessions_become_records() {
    let mut session = EmailSession::new(5);
    session.to = "a@x.com".to_owned();
    assert_eq!(NewScheduledEmail::from_session(session.clone()), None);

    session.schedule = SendTime::At("2099-01-01 00:00".to_owned());
    let record = NewScheduledEmail::from_session(session).expect("timed session");
    assert_eq!(record.chat_id, 5);
    assert_eq!(record.send_at, "2099-01-01 00:00");
    assert!(record.attachments.is_empty());
}

#[test]
fn status_round_trips_through_text() {
    for status in [EmailStatus::Pending, EmailStatus::Sent] {
        assert_eq!(EmailStatus::parse(status.as_str()).expect("parse"), status);
    }
    assert!(EmailStatus::parse("failed").is_err());
}
