//! Outbound email delivery.
//!
//! Delivery is fire-and-forget from the caller's perspective: the send is
//! spawned onto the runtime and failures are logged, never surfaced to the
//! request that triggered the mail. Registration and reset-request flows must
//! not fail just because the relay is down.

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::ExposeSecret;
use thiserror::Error;

use camellia_core::Email;

use crate::config::SmtpConfig;

/// Errors that can occur when building the SMTP mailer.
#[derive(Debug, Error)]
pub enum MailerError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The configured from address is invalid.
    #[error("invalid from address: {0}")]
    InvalidFromAddress(String),
}

/// Narrow interface for notification delivery.
pub trait Mailer: Send + Sync {
    /// Queue a plain-text message. Never blocks and never fails the caller.
    fn send(&self, to: &Email, subject: &str, body: &str);
}

/// SMTP-backed mailer using lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a mailer from SMTP configuration.
    ///
    /// # Errors
    ///
    /// Returns `MailerError` if the relay address or from address is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailerError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| MailerError::InvalidFromAddress(e.to_string()))?;

        Ok(Self { transport, from })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, to: &Email, subject: &str, body: &str) {
        let to_mailbox: Mailbox = match to.as_str().parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                tracing::warn!(error = %e, "invalid recipient address, dropping email");
                return;
            }
        };

        let message = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned());

        match message {
            Ok(message) => {
                let transport = self.transport.clone();
                let recipient = to.to_string();
                tokio::spawn(async move {
                    if let Err(e) = transport.send(message).await {
                        tracing::warn!(error = %e, recipient = %recipient, "email delivery failed");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "failed to build email message"),
        }
    }
}

/// Mailer used when SMTP is not configured; logs instead of delivering.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &Email, subject: &str, body: &str) {
        tracing::info!(recipient = %to, subject, "smtp not configured, logging email instead");
        tracing::debug!(body, "email body");
    }
}
