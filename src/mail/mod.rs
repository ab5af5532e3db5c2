//! Outbound email: message building, SMTP transport, and delivery policies.
//!
//! [`Outbox`] fans a [`Draft`] out to every recipient, building one message
//! per recipient. Two policies exist and are kept separate on purpose:
//!
//! - [`Outbox::send_abort_on_failure`] stops at the first failed recipient.
//!   Used for interactive "send now".
//! - [`Outbox::send_best_effort`] tries every recipient and reports each
//!   outcome. Used by the scheduled worker.

pub mod message;
pub mod transport;

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

pub use self::message::{build_message, load_attachments, OutgoingAttachment, StoredAttachment};
pub use self::transport::{MailTransport, SmtpTransport};

/// Errors from building or submitting a single message.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// An address could not be parsed.
    #[error("invalid email address: {0}")]
    Address(String),

    /// lettre rejected the assembled message.
    #[error("failed to build message: {0}")]
    Build(String),

    /// The SMTP server or connection rejected the message.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// An attachment could not be read from disk.
    #[error("failed to read attachment {name}: {source}")]
    Attachment {
        /// Filename of the attachment.
        name: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Failure of the abort-on-first-failure policy.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The recipient list contained no addresses.
    #[error("no recipients given")]
    NoRecipients,

    /// Attachments could not be loaded, so nothing was sent.
    #[error(transparent)]
    Attachment(MailError),

    /// Delivery to `recipient` failed; later recipients were not attempted.
    #[error("delivery to {recipient} failed: {source}")]
    Recipient {
        /// The address that failed.
        recipient: String,
        /// Why it failed.
        source: MailError,
        /// Addresses that had already been delivered to.
        delivered: Vec<String>,
    },
}

/// Everything needed to send one email to a list of recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Raw comma-separated recipient list.
    pub recipients: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Files to attach, in order.
    pub attachments: Vec<StoredAttachment>,
}

/// Per-recipient outcome of the best-effort policy.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Addresses the transport accepted.
    pub delivered: Vec<String>,
    /// Addresses that failed, with the reason.
    pub failed: Vec<(String, MailError)>,
    /// Set when attachments could not be loaded and no recipient was tried.
    pub not_attempted: Option<MailError>,
}

impl DeliveryReport {
    /// `true` when every recipient failed or there were none.
    pub fn nothing_delivered(&self) -> bool {
        self.delivered.is_empty()
    }
}

/// Split a raw recipient list on commas, trimming and skipping empty entries.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Sends drafts through a [`MailTransport`] from a fixed sender.
pub struct Outbox {
    from: String,
    transport: Arc<dyn MailTransport>,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl Outbox {
    /// Create an outbox sending as `from`.
    pub fn new(from: impl Into<String>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            from: from.into(),
            transport,
        }
    }

    /// Deliver to each recipient in order, stopping at the first failure.
    ///
    /// Returns the number of recipients delivered to.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] describing the first failure. Recipients
    /// after the failing one are never attempted.
    pub async fn send_abort_on_failure(&self, draft: &Draft) -> Result<usize, DeliveryError> {
        let recipients = split_recipients(&draft.recipients);
        if recipients.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }
        let attachments = load_attachments(&draft.attachments)
            .await
            .map_err(DeliveryError::Attachment)?;

        let date = SystemTime::now();
        let mut delivered = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            if let Err(source) = self.deliver_one(draft, &recipient, &attachments, date).await {
                warn!(recipient = %recipient, error = %source, "delivery failed, aborting remaining recipients");
                return Err(DeliveryError::Recipient {
                    recipient,
                    source,
                    delivered,
                });
            }
            debug!(recipient = %recipient, "email delivered");
            delivered.push(recipient);
        }
        Ok(delivered.len())
    }

    /// Attempt every recipient independently and report each outcome.
    ///
    /// An unreadable attachment means no recipient is attempted; see
    /// [`DeliveryReport::not_attempted`].
    pub async fn send_best_effort(&self, draft: &Draft) -> DeliveryReport {
        let recipients = split_recipients(&draft.recipients);
        let mut report = DeliveryReport::default();

        let attachments = match load_attachments(&draft.attachments).await {
            Ok(a) => a,
            Err(e) => {
                report.not_attempted = Some(e);
                return report;
            }
        };

        let date = SystemTime::now();
        for recipient in recipients {
            match self.deliver_one(draft, &recipient, &attachments, date).await {
                Ok(()) => report.delivered.push(recipient),
                Err(e) => report.failed.push((recipient, e)),
            }
        }
        report
    }

    async fn deliver_one(
        &self,
        draft: &Draft,
        recipient: &str,
        attachments: &[OutgoingAttachment],
        date: SystemTime,
    ) -> Result<(), MailError> {
        let message = build_message(
            &self.from,
            recipient,
            &draft.subject,
            &draft.body,
            attachments,
            date,
        )?;
        self.transport.deliver(&self.from, recipient, &message).await
    }
}
