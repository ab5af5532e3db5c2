//! Step-by-step email composition.
//!
//! An [`EmailSession`] tracks one chat's progress through the compose flow.
//! [`advance`] is the whole state machine: it takes the current session and
//! one input and returns the updated session (or a terminal action) plus the
//! prompts to show. It performs no I/O; the dispatcher executes the result.
//!
//! ```text
//! AwaitingRecipients -> AwaitingSubject -> AwaitingBody -> AwaitingAttachmentChoice
//!     "yes" -> AwaitingAttachmentUpload -> (file | "skip") -> AwaitingSendDecision
//!     "no"  -> AwaitingSendDecision
//! AwaitingSendDecision -> "now" => SendNow | anything else => Schedule
//! ```

pub mod store;

use chrono::{DateTime, Utc};

use crate::mail::{Draft, StoredAttachment};
use crate::telegram::ui::escape_html_truncated;

pub use self::store::SessionStore;

/// Escaped-length caps for preview fields. Together with the fixed text they
/// keep the preview under Telegram's message limit.
const PREVIEW_TO_CHARS: usize = 300;
const PREVIEW_SUBJECT_CHARS: usize = 300;
const PREVIEW_BODY_CHARS: usize = 3000;
const PREVIEW_ATTACHMENT_CHARS: usize = 200;

/// Words that mean "send immediately" at the final step (case-insensitive).
const SEND_NOW_WORDS: [&str; 3] = ["now", "send", "send now"];

/// Where a session is in the compose flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Waiting for the comma-separated recipient list.
    AwaitingRecipients,
    /// Waiting for the subject line.
    AwaitingSubject,
    /// Waiting for the body text.
    AwaitingBody,
    /// Waiting for `yes` or `no` to attaching a file.
    AwaitingAttachmentChoice,
    /// Waiting for a file upload or `skip`.
    AwaitingAttachmentUpload,
    /// Preview shown; waiting for `now` or a schedule time.
    AwaitingSendDecision,
}

impl Step {
    /// Whether a file upload is meaningful at this step.
    pub fn accepts_file(self) -> bool {
        self == Self::AwaitingAttachmentUpload
    }
}

/// When the composed email should go out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SendTime {
    /// Deliver within the current interaction.
    #[default]
    Immediately,
    /// Raw time text as typed by the user, parsed later by the worker.
    At(String),
}

/// In-progress composition for one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSession {
    /// Current step.
    pub step: Step,
    /// Originating chat.
    pub chat_id: i64,
    /// Raw recipient list, not yet validated.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
    /// Uploaded file, if any.
    pub attachment: Option<StoredAttachment>,
    /// Send decision; only meaningful once the flow finishes.
    pub schedule: SendTime,
    /// When the session began.
    pub created_at: DateTime<Utc>,
}

impl EmailSession {
    /// Start a fresh composition at [`Step::AwaitingRecipients`].
    pub fn new(chat_id: i64) -> Self {
        Self {
            step: Step::AwaitingRecipients,
            chat_id,
            to: String::new(),
            subject: String::new(),
            body: String::new(),
            attachment: None,
            schedule: SendTime::Immediately,
            created_at: Utc::now(),
        }
    }

    /// The deliverable content of this session.
    pub fn draft(&self) -> Draft {
        Draft {
            recipients: self.to.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            attachments: self.attachment.iter().cloned().collect(),
        }
    }
}

/// One inbound event as seen by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeInput {
    /// Free text.
    Text(String),
    /// A file that has already been saved locally.
    Attachment(StoredAttachment),
}

/// How a finished session should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// Deliver now, aborting on the first failed recipient.
    SendNow(EmailSession),
    /// Persist as a scheduled email; `session.schedule` holds the time.
    Schedule(EmailSession),
}

/// What happens to the session after an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Keep the (possibly updated) session.
    Continue(EmailSession),
    /// Drop the session and perform the terminal action.
    Finish(Terminal),
}

/// Result of feeding one input to [`advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Session outcome.
    pub next: Next,
    /// Prompts to send back, in order (HTML).
    pub replies: Vec<String>,
}

impl Transition {
    fn stay(session: EmailSession, reply: impl Into<String>) -> Self {
        Self {
            next: Next::Continue(session),
            replies: vec![reply.into()],
        }
    }
}

/// Prompt shown when a composition begins.
pub const RECIPIENTS_PROMPT: &str =
    "📬 Who do you want to send the email to? (comma separated addresses are allowed)";
const SUBJECT_PROMPT: &str = "✏️ Subject?";
const BODY_PROMPT: &str = "📝 Body text? (send it as a single message)";
const ATTACH_CHOICE_PROMPT: &str =
    "📎 Do you want to attach a file? Reply <code>yes</code> to attach or <code>no</code> to skip.";
const ATTACH_CHOICE_REPROMPT: &str = "Please reply with <code>yes</code> or <code>no</code>.";
const UPLOAD_PROMPT: &str =
    "📂 Please upload the file now (send it as a document), or type <code>skip</code>.";
const UPLOAD_REPROMPT: &str =
    "Waiting for file upload. Send a document or type <code>skip</code>.";
/// Reply to a file sent outside the upload step.
pub const UNEXPECTED_FILE: &str = "I'm not expecting a file right now.";
/// Reply sent just before an immediate delivery starts.
pub const SENDING_NOW: &str = "📤 Sending now...";

/// Feed one input to the state machine.
pub fn advance(mut session: EmailSession, input: ComposeInput) -> Transition {
    let text = match input {
        ComposeInput::Attachment(attachment) => {
            if !session.step.accepts_file() {
                return Transition::stay(session, UNEXPECTED_FILE);
            }
            session.attachment = Some(attachment);
            return to_send_decision(session);
        }
        ComposeInput::Text(text) => text.trim().to_owned(),
    };

    match session.step {
        Step::AwaitingRecipients => {
            session.to = text;
            session.step = Step::AwaitingSubject;
            Transition::stay(session, SUBJECT_PROMPT)
        }
        Step::AwaitingSubject => {
            session.subject = text;
            session.step = Step::AwaitingBody;
            Transition::stay(session, BODY_PROMPT)
        }
        Step::AwaitingBody => {
            session.body = text;
            session.step = Step::AwaitingAttachmentChoice;
            Transition::stay(session, ATTACH_CHOICE_PROMPT)
        }
        Step::AwaitingAttachmentChoice => match text.to_lowercase().as_str() {
            "yes" => {
                session.step = Step::AwaitingAttachmentUpload;
                Transition::stay(session, UPLOAD_PROMPT)
            }
            "no" => to_send_decision(session),
            _ => Transition::stay(session, ATTACH_CHOICE_REPROMPT),
        },
        Step::AwaitingAttachmentUpload => {
            if text.eq_ignore_ascii_case("skip") {
                to_send_decision(session)
            } else {
                Transition::stay(session, UPLOAD_REPROMPT)
            }
        }
        Step::AwaitingSendDecision => {
            if is_send_now(&text) {
                session.schedule = SendTime::Immediately;
                Transition {
                    next: Next::Finish(Terminal::SendNow(session)),
                    replies: vec![SENDING_NOW.to_owned()],
                }
            } else {
                session.schedule = SendTime::At(text);
                Transition {
                    next: Next::Finish(Terminal::Schedule(session)),
                    replies: Vec::new(),
                }
            }
        }
    }
}

/// Move to the final step and emit the preview.
fn to_send_decision(mut session: EmailSession) -> Transition {
    session.step = Step::AwaitingSendDecision;
    let preview = render_preview(&session);
    Transition::stay(session, preview)
}

fn is_send_now(text: &str) -> bool {
    let lower = text.to_lowercase();
    SEND_NOW_WORDS.contains(&lower.as_str())
}

/// Summary shown before the send decision (HTML).
pub fn render_preview(session: &EmailSession) -> String {
    let attachment = session
        .attachment
        .as_ref()
        .map_or_else(
            || "none".to_owned(),
            |a| escape_html_truncated(&a.name, PREVIEW_ATTACHMENT_CHARS),
        );
    format!(
        "📬 <b>Preview</b>\n\
         <b>To:</b> {to}\n\
         <b>Subject:</b> {subject}\n\
         <b>Body:</b> {body}\n\
         <b>Attachment:</b> {attachment}\n\n\
         Type <code>now</code> to send immediately, or a time to schedule \
         (<code>YYYY-MM-DD HH:MM</code> or RFC 3339).",
        to = escape_html_truncated(&session.to, PREVIEW_TO_CHARS),
        subject = escape_html_truncated(&session.subject, PREVIEW_SUBJECT_CHARS),
        body = escape_html_truncated(&session.body, PREVIEW_BODY_CHARS),
    )
}
