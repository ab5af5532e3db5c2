//! Message builder: turns a composed email into RFC 5322 bytes via lettre.
//!
//! Output is deterministic for a given input and send time. The body is a
//! base64 `text/plain; charset=utf-8` part. With attachments the message
//! becomes `multipart/mixed` using [`BOUNDARY`].

use std::path::Path;
use std::time::SystemTime;

use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use serde::{Deserialize, Serialize};

use super::MailError;

/// Multipart boundary marker. Base64 output never contains `-`, so the
/// marker cannot collide with encoded part content.
pub const BOUNDARY: &str = "----mailwizard-boundary-7f3a9c";

/// A file saved on local disk and referenced by an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAttachment {
    /// Filename shown to the recipient.
    pub name: String,
    /// Where the content lives on disk.
    pub path: std::path::PathBuf,
}

/// Attachment content ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingAttachment {
    /// Filename shown to the recipient.
    pub name: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

/// Read every referenced attachment from disk, in order.
///
/// # Errors
///
/// Returns [`MailError::Attachment`] naming the first file that cannot be read.
pub async fn load_attachments(
    attachments: &[StoredAttachment],
) -> Result<Vec<OutgoingAttachment>, MailError> {
    let mut loaded = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        loaded.push(load_attachment(&attachment.name, &attachment.path).await?);
    }
    Ok(loaded)
}

async fn load_attachment(name: &str, path: &Path) -> Result<OutgoingAttachment, MailError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| MailError::Attachment {
            name: name.to_owned(),
            source,
        })?;
    Ok(OutgoingAttachment {
        name: name.to_owned(),
        content,
    })
}

/// Build a transport-ready message for a single recipient.
///
/// `date` becomes the `Date:` header.
///
/// # Errors
///
/// Returns [`MailError::Address`] when `from` or `to` is not a mailbox, and
/// [`MailError::Build`] when lettre rejects the assembled message.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachments: &[OutgoingAttachment],
    date: SystemTime,
) -> Result<Vec<u8>, MailError> {
    let from_mailbox: Mailbox = from
        .parse()
        .map_err(|_| MailError::Address(from.to_owned()))?;
    let to_mailbox: Mailbox = to.parse().map_err(|_| MailError::Address(to.to_owned()))?;

    let builder = Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(header_value(subject))
        .date(date);

    let built = if attachments.is_empty() {
        builder.singlepart(text_part(body))
    } else {
        let octet_stream = ContentType::parse("application/octet-stream")
            .map_err(|e| MailError::Build(e.to_string()))?;
        let mut multi = MultiPart::mixed()
            .boundary(BOUNDARY)
            .singlepart(text_part(body));
        for attachment in attachments {
            multi = multi.singlepart(
                Attachment::new(header_value(&attachment.name))
                    .body(attachment.content.clone(), octet_stream.clone()),
            );
        }
        builder.multipart(multi)
    };
    let message = built.map_err(|e| MailError::Build(e.to_string()))?;

    Ok(message.formatted())
}

fn text_part(body: &str) -> SinglePart {
    SinglePart::builder()
        .content_type(ContentType::TEXT_PLAIN)
        .header(ContentTransferEncoding::Base64)
        .body(body.to_owned())
}

/// Collapse line breaks so user text cannot inject extra headers.
fn header_value(raw: &str) -> String {
    raw.split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
