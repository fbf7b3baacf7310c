//! Mail transport

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Mail transport errors
#[derive(Debug, Error)]
pub enum MailError {
    /// Could not reach or log into the mail server
    #[error("authentication failed: {0}")]
    Auth(String),

    /// `send` called before a successful `authenticate`
    #[error("not authenticated")]
    NotAuthenticated,

    /// Address could not be parsed
    #[error("invalid address {address:?}: {reason}")]
    Address {
        /// Offending address
        address: String,
        /// Parser message
        reason: String,
    },

    /// Server refused or dropped the message
    #[error("delivery to {recipient} failed: {reason}")]
    Send {
        /// Recipient address
        recipient: String,
        /// Transport message
        reason: String,
    },
}

/// A fully rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Sender address
    pub from: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html_body: String,
}

/// Something that can deliver email
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Log into the mail server. Must succeed before `send`.
    async fn authenticate(&self, username: &str, password: &str) -> Result<(), MailError>;

    /// Deliver `mail` to a single recipient
    async fn send(&self, mail: &OutgoingMail, to: &str) -> Result<(), MailError>;
}

/// SMTP relay with STARTTLS
pub struct SmtpMailer {
    host: String,
    port: u16,
    transport: Mutex<Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>>,
}

impl SmtpMailer {
    /// Create a mailer for `host:port`; nothing is contacted until `authenticate`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            transport: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn authenticate(&self, username: &str, password: &str) -> Result<(), MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| MailError::Auth(e.to_string()))?
            .port(self.port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        match transport.test_connection().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(MailError::Auth(format!(
                    "{}:{} did not accept the connection",
                    self.host, self.port
                )))
            }
            Err(e) => return Err(MailError::Auth(e.to_string())),
        }

        debug!(host = %self.host, port = self.port, "SMTP connection verified");
        *self.transport.lock() = Some(Arc::new(transport));
        Ok(())
    }

    async fn send(&self, mail: &OutgoingMail, to: &str) -> Result<(), MailError> {
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or(MailError::NotAuthenticated)?;

        let message = Message::builder()
            .from(parse_mailbox(&mail.from)?)
            .to(parse_mailbox(to)?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body.clone())
            .map_err(|e| MailError::Send {
                recipient: to.to_string(),
                reason: e.to_string(),
            })?;

        transport.send(message).await.map_err(|e| MailError::Send {
            recipient: to.to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<lettre::message::Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}
