//! Mail delivery of assembled documents over SMTP.
//!
//! One session per send: connect, authenticate, transmit one message,
//! disconnect. The transport is built per call and dropped on every exit path,
//! so no connection outlives a send. Implicit TLS unless `smtp_tls` is off.
//!
//! The session timeout is enforced by the transport on every socket operation.
//! The blocking send is always awaited to completion, so a reported failure
//! means nothing was left running in the background.

use crate::assembler::AssembledDocument;
use crate::delivery::PDF_MIME;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use photomerge_common::config::MailServerConfig;
use std::io;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail relay is not configured")]
    NotConfigured,

    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Compose(String),

    #[error("SMTP connection failed: {0}")]
    Connection(String),

    #[error("SMTP authentication failed: {0}")]
    Auth(String),

    #[error("SMTP transmission failed: {0}")]
    Transmission(String),

    #[error("SMTP session timed out after {0} seconds")]
    Timeout(u64),

    #[error("Mail task failed: {0}")]
    Task(String),
}

/// Sends an assembled document to one recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_document(
        &self,
        to: &str,
        document: &AssembledDocument,
        filename: &str,
    ) -> Result<(), MailError>;
}

/// Build the outgoing message: fixed subject and body, one PDF attachment.
///
/// The recipient is trimmed of surrounding whitespace.
pub fn compose(
    config: &MailServerConfig,
    to: &str,
    document: &AssembledDocument,
    filename: &str,
) -> Result<Message, MailError> {
    let from_raw = config.from_address.as_deref().ok_or(MailError::NotConfigured)?;
    let from: Mailbox = parse_mailbox(from_raw)?;
    let to: Mailbox = parse_mailbox(to)?;

    let content_type =
        ContentType::parse(PDF_MIME).map_err(|e| MailError::Compose(e.to_string()))?;
    let attachment = Attachment::new(filename.to_string()).body(document.to_vec(), content_type);

    Message::builder()
        .from(from)
        .to(to)
        .subject(config.subject.clone())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(config.body.clone()))
                .singlepart(attachment),
        )
        .map_err(|e| MailError::Compose(e.to_string()))
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, MailError> {
    let address = raw.trim();
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Sort an SMTP failure into the step it happened at.
fn classify(err: &lettre::transport::smtp::Error, timeout: Duration) -> MailError {
    if err.is_timeout() || timed_out(err) {
        return MailError::Timeout(timeout.as_secs());
    }
    let code = err.status().map(|c| c.to_string());
    match code.as_deref() {
        // 530 auth required, 534 mechanism too weak, 535 credentials rejected
        Some("530" | "534" | "535") => MailError::Auth(err.to_string()),
        Some(_) => MailError::Transmission(err.to_string()),
        None => MailError::Connection(err.to_string()),
    }
}

/// Socket read timeouts surface as `WouldBlock` on unix, which lettre does
/// not count as a timeout.
fn timed_out(err: &lettre::transport::smtp::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock);
        }
        source = e.source();
    }
    false
}

/// `Mailer` backed by a real SMTP relay.
pub struct SmtpMailer {
    config: MailServerConfig,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: MailServerConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn create_smtp_transport(&self) -> Result<SmtpTransport, MailError> {
        let (host, port) = self
            .config
            .relay_host_port()
            .ok_or(MailError::NotConfigured)?;
        let (Some(login), Some(password)) = (&self.config.login, &self.config.password) else {
            return Err(MailError::NotConfigured);
        };

        let creds = Credentials::new(login.clone(), password.clone());
        let builder = if self.config.smtp_tls {
            SmtpTransport::relay(&host).map_err(|e| MailError::Connection(e.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&host)
        };
        let transport = builder
            .port(port)
            .credentials(creds)
            .timeout(Some(self.timeout))
            .build();
        Ok(transport)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_document(
        &self,
        to: &str,
        document: &AssembledDocument,
        filename: &str,
    ) -> Result<(), MailError> {
        let transport = self.create_smtp_transport()?;
        let email = compose(&self.config, to, document, filename)?;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            transport.send(&email).map(|_| ()).map_err(|e| classify(&e, timeout))
        })
        .await
        .map_err(|e| MailError::Task(e.to_string()))??;

        tracing::info!(
            to = %to.trim(),
            filename = %filename,
            bytes = document.len(),
            "Mail sent"
        );
        Ok(())
    }
}
