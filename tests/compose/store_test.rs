//! Tests for `src/compose/store.rs` — per-chat session storage.

use std::sync::Arc;

use mailwizard::compose::{EmailSession, SessionStore, Step};

#[tokio::test]
async fn absent_chat_reports_nothing() {
    let store = SessionStore::new();
    assert!(!store.exists(1).await);
    assert_eq!(store.get(1).await, None);
    assert!(!store.delete(1).await);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn set_get_delete_round_trip() {
    let store = SessionStore::new();
    let session = EmailSession::new(1);
    store.set(1, session.clone()).await;

    assert!(store.exists(1).await);
    assert_eq!(store.get(1).await, Some(session));
    assert!(store.delete(1).await);
    assert!(!store.exists(1).await);
}

#[tokio::test]
async fn new_session_replaces_the_old_one() {
    let store = SessionStore::new();
    let mut old = EmailSession::new(1);
    old.step = Step::AwaitingBody;
    old.subject = "old subject".to_owned();
    store.set(1, old).await;

    store.set(1, EmailSession::new(1)).await;

    let current = store.get(1).await.expect("session should exist");
    assert_eq!(current.step, Step::AwaitingRecipients);
    assert!(current.subject.is_empty());
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn chats_are_independent() {
    let store = SessionStore::new();
    store.set(1, EmailSession::new(1)).await;
    store.set(2, EmailSession::new(2)).await;

    assert!(store.delete(1).await);
    assert!(store.exists(2).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_chats_do_not_interfere() {
    let store = Arc::new(SessionStore::new());
    let mut handles = Vec::new();
    for chat_id in 0..32_i64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut session = EmailSession::new(chat_id);
            session.to = format!("user{chat_id}@x.com");
            store.set(chat_id, session).await;
            store.get(chat_id).await
        }));
    }
    for (chat_id, handle) in handles.into_iter().enumerate() {
        let session = handle
            .await
            .expect("task should not panic")
            .expect("session should be present");
        assert_eq!(session.to, format!("user{chat_id}@x.com"));
    }
    assert_eq!(store.len().await, 32);
}
