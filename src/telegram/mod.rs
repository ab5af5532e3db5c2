//! Telegram adapter: update conversion, reply texts, and the bot event loop.
//!
//! Turns teloxide [`Message`]s into [`InboundEvent`]s and hands them to the
//! shared [`Dispatcher`]. Replies go back through [`media::TelegramChat`].

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use tracing::{debug, info};

use crate::dispatch::{self, FileRef, InboundEvent, Payload};

pub mod commands;
pub mod media;
pub mod ui;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Run the Telegram bot until it is stopped (Ctrl+C).
///
/// Updates from one chat are handled in order; different chats may be
/// handled concurrently.
pub async fn run_telegram(bot: Bot, dispatcher: Arc<dispatch::Dispatcher>) {
    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    info!("telegram dispatcher starting");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram dispatcher stopped");
}

// ---------------------------------------------------------------------------
// Message handler
// ---------------------------------------------------------------------------

async fn handle_message(msg: Message, dispatcher: Arc<dispatch::Dispatcher>) -> ResponseResult<()> {
    let event = inbound_event(&msg);
    debug!(chat_id = event.chat_id, "telegram message received");
    dispatcher.handle(event).await;
    Ok(())
}

/// Convert a Telegram message into a transport-neutral event.
///
/// Documents keep their original filename; photos use the largest size and
/// a generated `photo_<timestamp>.jpg` name.
pub fn inbound_event(msg: &Message) -> InboundEvent {
    let payload = if let Some(text) = msg.text() {
        Payload::from_text(text)
    } else if let Some(document) = msg.document() {
        let file_id: &str = &document.file.id;
        Payload::File(FileRef {
            file_id: file_id.to_owned(),
            file_name: document
                .file_name
                .clone()
                .unwrap_or_else(media::document_fallback_name),
        })
    } else if let Some(photo) = msg.photo().and_then(<[_]>::last) {
        let file_id: &str = &photo.file.id;
        Payload::File(FileRef {
            file_id: file_id.to_owned(),
            file_name: media::photo_file_name(),
        })
    } else {
        Payload::Unsupported
    };

    InboundEvent {
        chat_id: msg.chat.id.0,
        payload,
    }
}
