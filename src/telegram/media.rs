//! File naming and the Telegram side of the [`ChatTransport`] seam.
//!
//! [`TelegramChat`] sends HTML replies and downloads uploaded files to a
//! local path chosen by the dispatcher.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::debug;

use crate::dispatch::{ChatTransport, FileRef};

/// Name for a photo upload, which carries no filename of its own.
pub fn photo_file_name() -> String {
    format!("photo_{}.jpg", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Name for a document sent without a filename.
pub fn document_fallback_name() -> String {
    format!("doc_{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Sanitize a filename to prevent path traversal attacks.
///
/// Replaces path separators (`/`, `\`) with underscores and strips leading
/// dots so the file stays inside the target directory. Returns a
/// timestamp-based fallback name if the result would be empty.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .replace(['/', '\\', '\0'], "_")
        .trim_start_matches('.')
        .to_owned();

    if sanitized.is_empty() {
        document_fallback_name()
    } else {
        sanitized
    }
}

/// Telegram-backed [`ChatTransport`].
#[derive(Debug, Clone)]
pub struct TelegramChat {
    bot: Bot,
}

impl TelegramChat {
    /// Wrap a bot handle.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramChat {
    async fn send_text(&self, chat_id: i64, html: &str) -> anyhow::Result<()> {
        self.bot
            .send_message(ChatId(chat_id), html)
            .parse_mode(ParseMode::Html)
            .await
            .context("failed to send telegram message")?;
        Ok(())
    }

    async fn fetch_file(&self, file: &FileRef, dest: &Path) -> anyhow::Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create attachment directory: {}", parent.display())
            })?;
        }

        let remote = self
            .bot
            .get_file(file.file_id.as_str())
            .await
            .context("failed to get file info from Telegram")?;

        let mut dst = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("failed to create file at {}", dest.display()))?;

        self.bot
            .download_file(&remote.path, &mut dst)
            .await
            .context("failed to download file from Telegram")?;

        debug!(path = %dest.display(), "attachment downloaded");
        Ok(())
    }
}
