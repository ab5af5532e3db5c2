//! Mail transport trait and the lettre-backed SMTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::MailError;
use crate::config::{SmtpConfig, TlsMode};

/// Submits one fully built message to one recipient.
///
/// Implement this to plug in another backend; tests use an in-memory fake.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Deliver `message` from `from` to `to`.
    async fn deliver(&self, from: &str, to: &str, message: &[u8]) -> Result<(), MailError>;
}

/// SMTP submission through lettre.
#[derive(Clone)]
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport").finish_non_exhaustive()
    }
}

impl SmtpTransport {
    /// Build a pooled SMTP client from configuration.
    ///
    /// No connection is opened until the first delivery.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Smtp`] if the TLS relay cannot be configured.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailError> {
        let builder = match config.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            TlsMode::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| MailError::Smtp(e.to_string()))?
            }
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, from: &str, to: &str, message: &[u8]) -> Result<(), MailError> {
        let sender: Mailbox = from
            .parse()
            .map_err(|_| MailError::Address(from.to_owned()))?;
        let recipient: Mailbox = to.parse().map_err(|_| MailError::Address(to.to_owned()))?;
        let envelope = Envelope::new(Some(sender.email), vec![recipient.email])
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        self.transport
            .send_raw(&envelope, message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        Ok(())
    }
}
