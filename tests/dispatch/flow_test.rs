//! End-to-end compose flows through the dispatcher.

use mailwizard::compose::{Step, RECIPIENTS_PROMPT, SENDING_NOW, UNEXPECTED_FILE};
use mailwizard::schedule::EmailStatus;

use crate::support::{downloaded_bytes, Harness, HarnessOptions};

const CHAT: i64 = 100;

#[tokio::test]
async fn send_now_delivers_to_every_recipient() {
    let h = Harness::new().await;
    h.compose_until_decision(CHAT, "a@x.com, b@x.com").await;
    h.say(CHAT, "now").await;

    assert_eq!(h.mail.recipients(), vec!["a@x.com", "b@x.com"]);
    let replies = h.chat.replies_to(CHAT);
    assert!(replies.contains(&SENDING_NOW.to_owned()));
    assert!(h.chat.last_reply(CHAT).starts_with("✅"));
    assert!(!h.dispatcher.sessions().exists(CHAT).await);
}

#[tokio::test]
async fn send_now_aborts_after_first_failure_and_names_it() {
    let h = Harness::with(HarnessOptions {
        failing_recipients: vec!["a@x.com"],
        ..HarnessOptions::default()
    })
    .await;
    h.compose_until_decision(CHAT, "a@x.com, b@x.com").await;
    h.say(CHAT, "send now").await;

    assert_eq!(h.mail.recipients(), vec!["a@x.com"]);
    let last = h.chat.last_reply(CHAT);
    assert!(last.starts_with("❌ Failed to send"));
    assert!(last.contains("a@x.com"));
    assert!(!h.dispatcher.sessions().exists(CHAT).await);
}

#[tokio::test]
async fn every_reply_walks_the_prompts_in_order() {
    let h = Harness::new().await;
    h.compose_until_decision(CHAT, "a@x.com").await;

    let replies = h.chat.replies_to(CHAT);
    assert_eq!(replies.len(), 5);
    assert_eq!(replies[0], RECIPIENTS_PROMPT);
    assert!(replies[1].contains("Subject"));
    assert!(replies[2].contains("Body"));
    assert!(replies[3].contains("attach"));
    assert!(replies[4].contains("Preview"));

    let session = h.dispatcher.sessions().get(CHAT).await.expect("session");
    assert_eq!(session.step, Step::AwaitingSendDecision);
}

#[tokio::test]
async fn schedule_persists_record_and_confirms_due_time() {
    let h = Harness::new().await;
    h.compose_until_decision(CHAT, "a@x.com").await;
    h.say(CHAT, "2099-01-01 00:00").await;

    assert!(h.mail.recipients().is_empty());
    let rows = h.store.list_by_chat(CHAT, 20).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].send_at, "2099-01-01 00:00");
    assert_eq!(rows[0].subject, "Status update");
    assert_eq!(rows[0].status, EmailStatus::Pending);

    let last = h.chat.last_reply(CHAT);
    assert!(last.contains(&format!("ID {}", rows[0].id)));
    assert!(last.contains("2099-01-01 00:00 UTC"));
    assert!(!h.dispatcher.sessions().exists(CHAT).await);
}

#[tokio::test]
async fn unreadable_schedule_time_is_stored_but_flagged() {
    let h = Harness::new().await;
    h.compose_until_decision(CHAT, "a@x.com").await;
    h.say(CHAT, "tomorrow").await;

    let rows = h.store.list_by_chat(CHAT, 20).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].send_at, "tomorrow");
    assert!(h.chat.last_reply(CHAT).contains("could not read"));
}

#[tokio::test]
async fn uploaded_file_is_saved_per_chat_and_sent_as_attachment() {
    let h = Harness::new().await;
    h.compose_until_upload(CHAT, "a@x.com").await;
    h.upload(CHAT, "invoice.pdf").await;

    let saved = h.saved_files(CHAT);
    assert_eq!(saved.len(), 1);
    assert!(saved[0].ends_with("invoice.pdf"));
    assert_eq!(
        std::fs::read(&saved[0]).expect("saved file"),
        downloaded_bytes("file-invoice.pdf")
    );
    assert!(h.chat.last_reply(CHAT).contains("invoice.pdf"));

    h.say(CHAT, "now").await;
    let message = h.mail.message_to("a@x.com");
    assert!(message.contains("filename=\"invoice.pdf\""));
}

#[tokio::test]
async fn scheduled_attachment_reference_is_persisted() {
    let h = Harness::new().await;
    h.compose_until_upload(CHAT, "a@x.com").await;
    h.upload(CHAT, "../../invoice.pdf").await;
    h.say(CHAT, "2099-01-01 00:00").await;

    let rows = h.store.list_by_chat(CHAT, 20).await.expect("list");
    assert_eq!(rows[0].attachments.len(), 1);
    let attachment = &rows[0].attachments[0];
    assert_eq!(attachment.name, "_.._invoice.pdf");
    assert!(attachment.path.starts_with(h.attachments.path().join(CHAT.to_string())));
}

#[tokio::test]
async fn same_filename_later_does_not_replace_a_scheduled_attachment() {
    let h = Harness::new().await;
    h.compose_until_upload(CHAT, "a@x.com").await;
    h.upload_as(CHAT, "a.txt", "first-upload").await;
    h.say(CHAT, "2099-01-01 00:00").await;

    h.compose_until_upload(CHAT, "a@x.com").await;
    h.upload_as(CHAT, "a.txt", "second-upload").await;
    h.say(CHAT, "now").await;

    let rows = h.store.list_by_chat(CHAT, 20).await.expect("list");
    assert_eq!(rows.len(), 1);
    let scheduled = &rows[0].attachments[0];
    assert_eq!(scheduled.name, "a.txt");
    assert_eq!(
        std::fs::read(&scheduled.path).expect("scheduled file still on disk"),
        downloaded_bytes("first-upload")
    );
    assert!(h
        .mail
        .message_to("a@x.com")
        .contains("filename=\"a.txt\""));
    assert_eq!(h.saved_files(CHAT).len(), 2);
}

#[tokio::test]
async fn failed_download_keeps_the_upload_step() {
    let h = Harness::with(HarnessOptions {
        fail_downloads: true,
        ..HarnessOptions::default()
    })
    .await;
    h.say(CHAT, "/sendmail").await;
    h.say(CHAT, "a@x.com").await;
    h.say(CHAT, "s").await;
    h.say(CHAT, "b").await;
    h.say(CHAT, "yes").await;
    h.upload(CHAT, "big.zip").await;

    assert!(h.chat.last_reply(CHAT).starts_with("Failed to download file"));
    assert!(h.saved_files(CHAT).is_empty(), "partial download is removed");
    let session = h.dispatcher.sessions().get(CHAT).await.expect("session");
    assert_eq!(session.step, Step::AwaitingAttachmentUpload);
    assert_eq!(session.attachment, None);
}

#[tokio::test]
async fn file_before_the_upload_step_is_rejected() {
    let h = Harness::new().await;
    h.say(CHAT, "/sendmail").await;
    h.upload(CHAT, "early.pdf").await;

    assert_eq!(h.chat.last_reply(CHAT), UNEXPECTED_FILE);
    let session = h.dispatcher.sessions().get(CHAT).await.expect("session");
    assert_eq!(session.step, Step::AwaitingRecipients);
    assert!(!h.attachments.path().join(CHAT.to_string()).exists());
}

#[tokio::test]
async fn new_compose_discards_the_old_session() {
    let h = Harness::new().await;
    h.say(CHAT, "/sendmail").await;
    h.say(CHAT, "a@x.com").await;
    h.say(CHAT, "Old subject").await;
    h.say(CHAT, "/compose").await;

    let session = h.dispatcher.sessions().get(CHAT).await.expect("session");
    assert_eq!(session.step, Step::AwaitingRecipients);
    assert!(session.to.is_empty());
    assert!(session.subject.is_empty());
}

#[tokio::test]
async fn two_chats_compose_independently() {
    let h = Harness::new().await;
    h.say(1, "/sendmail").await;
    h.say(2, "/sendmail").await;
    h.say(1, "one@x.com").await;
    h.say(2, "two@x.com").await;

    let first = h.dispatcher.sessions().get(1).await.expect("session 1");
    let second = h.dispatcher.sessions().get(2).await.expect("session 2");
    assert_eq!(first.to, "one@x.com");
    assert_eq!(second.to, "two@x.com");
}
