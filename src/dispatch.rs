//! Routes inbound chat events to the compose flow or to command handlers.
//!
//! The [`Dispatcher`] knows nothing about Telegram. It consumes
//! [`InboundEvent`]s and talks back through a [`ChatTransport`], which the
//! Telegram adapter implements and tests fake.
//!
//! Routing order for each event:
//! 1. Chats outside a non-empty allow-list are refused.
//! 2. A file while a session is active goes to attachment handling.
//! 3. Text while a session is active goes to the state machine.
//! 4. A command goes to its handler.
//! 5. Anything else gets a hint to start composing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use tracing::{debug, error, info, warn};

use crate::compose::{
    self, ComposeInput, EmailSession, Next, SessionStore, Terminal, Transition, RECIPIENTS_PROMPT,
    UNEXPECTED_FILE,
};
use crate::mail::{Outbox, StoredAttachment};
use crate::schedule::time::parse_send_at;
use crate::schedule::{NewScheduledEmail, ScheduleStore};
use crate::telegram::commands;
use crate::telegram::media::sanitize_filename;
use crate::telegram::ui::escape_html;

/// Chat-side capabilities the dispatcher needs.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Send an HTML-formatted message to a chat.
    async fn send_text(&self, chat_id: i64, html: &str) -> anyhow::Result<()>;

    /// Download a previously received file to `dest`, creating parent dirs.
    async fn fetch_file(&self, file: &FileRef, dest: &Path) -> anyhow::Result<()>;
}

/// A file announced by the chat transport but not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Transport-specific file id.
    pub file_id: String,
    /// Original filename as sent by the user.
    pub file_name: String,
}

/// What an inbound event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A slash command, without the slash or any `@bot` suffix.
    Command {
        /// Command name, e.g. `sendmail`. Any arguments are ignored.
        name: String,
    },
    /// Plain text.
    Text(String),
    /// An uploaded file.
    File(FileRef),
    /// Something the bot cannot use (sticker, location, ...).
    Unsupported,
}

impl Payload {
    /// Classify a text message as a command or plain text.
    pub fn from_text(text: &str) -> Self {
        let Some(without_slash) = text.trim_start().strip_prefix('/') else {
            return Self::Text(text.to_owned());
        };
        let full_command = without_slash
            .split_whitespace()
            .next()
            .unwrap_or(without_slash);
        // Strip @bot_name suffix if present
        let name = full_command.split('@').next().unwrap_or(full_command);
        Self::Command {
            name: name.to_lowercase(),
        }
    }

    /// Whether this payload is a command.
    pub fn is_command(&self) -> bool {
        matches!(self, Self::Command { .. })
    }
}

/// One inbound event from one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Originating chat.
    pub chat_id: i64,
    /// What was sent.
    pub payload: Payload,
}

/// Static settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Allowed chat ids; empty allows everyone.
    pub allowed_users: Vec<i64>,
    /// Root directory for downloaded attachments.
    pub attachments_dir: PathBuf,
    /// Row limit for `/scheduled`.
    pub list_limit: u32,
    /// Offset for `YYYY-MM-DD HH:MM` times in confirmations.
    pub utc_offset: FixedOffset,
}

/// Reply when a chat with no session sends non-command input.
pub const FALLBACK_HINT: &str = "Hello! Use /sendmail to start composing an email.";
/// Reply to chats outside the allow-list.
pub const NOT_AUTHORIZED: &str = "Not authorized.";
/// Reply to an unrecognised slash command.
pub const UNKNOWN_COMMAND: &str = "Unknown command. Use /help";
const UNSUPPORTED_INPUT: &str = "Please send text, or a document when asked for a file.";

/// Routes events and owns all per-chat compose state.
pub struct Dispatcher {
    settings: DispatchSettings,
    sessions: SessionStore,
    schedules: Arc<ScheduleStore>,
    outbox: Arc<Outbox>,
    chat: Arc<dyn ChatTransport>,
    uploads: AtomicU64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher with an empty session store.
    pub fn new(
        settings: DispatchSettings,
        schedules: Arc<ScheduleStore>,
        outbox: Arc<Outbox>,
        chat: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            settings,
            sessions: SessionStore::new(),
            schedules,
            outbox,
            chat,
            uploads: AtomicU64::new(0),
        }
    }

    /// Active compose sessions.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one inbound event to completion.
    pub async fn handle(&self, event: InboundEvent) {
        let chat_id = event.chat_id;
        if !self.is_allowed(chat_id) {
            warn!(chat_id, "event dropped: chat not in allowed_users");
            self.reply(chat_id, NOT_AUTHORIZED).await;
            return;
        }

        let active = self.sessions.exists(chat_id).await;
        debug!(chat_id, active, command = event.payload.is_command(), "inbound event");

        match event.payload {
            Payload::File(file) if active => self.handle_file(chat_id, file).await,
            Payload::Text(text) if active => self.handle_text(chat_id, text).await,
            Payload::Unsupported if active => self.reply(chat_id, UNSUPPORTED_INPUT).await,
            Payload::Command { name } => self.handle_command(chat_id, &name).await,
            Payload::File(_) | Payload::Text(_) | Payload::Unsupported => {
                self.reply(chat_id, FALLBACK_HINT).await;
            }
        }
    }

    fn is_allowed(&self, chat_id: i64) -> bool {
        self.settings.allowed_users.is_empty() || self.settings.allowed_users.contains(&chat_id)
    }

    async fn reply(&self, chat_id: i64, html: &str) {
        if let Err(e) = self.chat.send_text(chat_id, html).await {
            warn!(chat_id, error = %e, "failed to send reply");
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&self, chat_id: i64, name: &str) {
        match name {
            "start" => self.reply(chat_id, &commands::handle_start()).await,
            "help" => self.reply(chat_id, &commands::handle_help()).await,
            "sendmail" | "compose" => {
                self.sessions.set(chat_id, EmailSession::new(chat_id)).await;
                info!(chat_id, "compose session started");
                self.reply(chat_id, RECIPIENTS_PROMPT).await;
            }
            "scheduled" => {
                let text = match self
                    .schedules
                    .list_by_chat(chat_id, self.settings.list_limit)
                    .await
                {
                    Ok(rows) => commands::format_scheduled(&rows),
                    Err(e) => {
                        error!(chat_id, error = %e, "failed to list scheduled emails");
                        format!(
                            "Failed to query scheduled emails: {}",
                            escape_html(&e.to_string())
                        )
                    }
                };
                self.reply(chat_id, &text).await;
            }
            "cancel" => {
                let had_session = self.sessions.delete(chat_id).await;
                if had_session {
                    info!(chat_id, "compose session cancelled");
                }
                self.reply(chat_id, &commands::handle_cancel(had_session))
                    .await;
            }
            other => {
                debug!(chat_id, command = other, "unknown command");
                self.reply(chat_id, UNKNOWN_COMMAND).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Compose flow
    // -----------------------------------------------------------------------

    async fn handle_text(&self, chat_id: i64, text: String) {
        let Some(session) = self.sessions.get(chat_id).await else {
            self.reply(chat_id, FALLBACK_HINT).await;
            return;
        };
        let transition = compose::advance(session, ComposeInput::Text(text));
        self.apply(chat_id, transition).await;
    }

    async fn handle_file(&self, chat_id: i64, file: FileRef) {
        let Some(session) = self.sessions.get(chat_id).await else {
            self.reply(chat_id, FALLBACK_HINT).await;
            return;
        };
        if !session.step.accepts_file() {
            self.reply(chat_id, UNEXPECTED_FILE).await;
            return;
        }

        let name = sanitize_filename(&file.file_name);
        let upload_dir = self.upload_dir(&session);
        let dest = upload_dir.join(&name);

        if let Err(e) = self.chat.fetch_file(&file, &dest).await {
            warn!(chat_id, file = %name, error = %e, "attachment download failed");
            discard_partial_upload(&upload_dir).await;
            self.reply(
                chat_id,
                &format!(
                    "Failed to download file: {}\nSend it again or type <code>skip</code>.",
                    escape_html(&format!("{e:#}"))
                ),
            )
            .await;
            return;
        }
        debug!(chat_id, path = %dest.display(), "attachment saved");

        let attachment = StoredAttachment { name, path: dest };
        let transition = compose::advance(session, ComposeInput::Attachment(attachment));
        self.apply(chat_id, transition).await;
    }

    /// A directory no other upload uses: `<root>/<chat_id>/<session start>-<seq>`.
    /// Files referenced by stored schedules are never overwritten.
    fn upload_dir(&self, session: &EmailSession) -> PathBuf {
        let seq = self.uploads.fetch_add(1, Ordering::Relaxed);
        self.settings
            .attachments_dir
            .join(session.chat_id.to_string())
            .join(format!(
                "{}-{seq}",
                session.created_at.format("%Y%m%dT%H%M%S%6f")
            ))
    }

    /// Store or drop the session, send the prompts, then run any terminal action.
    async fn apply(&self, chat_id: i64, transition: Transition) {
        let terminal = match transition.next {
            Next::Continue(session) => {
                debug!(chat_id, step = ?session.step, "session advanced");
                self.sessions.set(chat_id, session).await;
                None
            }
            Next::Finish(terminal) => {
                self.sessions.delete(chat_id).await;
                Some(terminal)
            }
        };

        for reply in &transition.replies {
            self.reply(chat_id, reply).await;
        }

        match terminal {
            Some(Terminal::SendNow(session)) => self.send_now(chat_id, &session).await,
            Some(Terminal::Schedule(session)) => self.schedule(chat_id, session).await,
            None => {}
        }
    }

    async fn send_now(&self, chat_id: i64, session: &EmailSession) {
        let text = match self.outbox.send_abort_on_failure(&session.draft()).await {
            Ok(count) => {
                info!(chat_id, recipients = count, "email sent");
                commands::sent_confirmation(count)
            }
            Err(e) => {
                warn!(chat_id, error = %e, "immediate send failed");
                format!("❌ Failed to send: {}", escape_html(&e.to_string()))
            }
        };
        self.reply(chat_id, &text).await;
    }

    async fn schedule(&self, chat_id: i64, session: EmailSession) {
        let Some(email) = NewScheduledEmail::from_session(session) else {
            return;
        };
        let raw = email.send_at.clone();

        let text = match self.schedules.insert(email).await {
            Ok(id) => {
                info!(chat_id, scheduled_id = id, send_at = %raw, "email scheduled");
                let due = parse_send_at(&raw, self.settings.utc_offset);
                commands::schedule_confirmation(id, &raw, due, Utc::now())
            }
            Err(e) => {
                error!(chat_id, error = %e, "failed to persist scheduled email");
                format!("Failed to schedule: {}", escape_html(&e.to_string()))
            }
        };
        self.reply(chat_id, &text).await;
    }
}

async fn discard_partial_upload(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(path = %dir.display(), "partial upload removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove partial upload"),
    }
}
