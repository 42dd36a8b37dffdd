//! Outbound mail.
//!
//! One blocking SMTP conversation per message, plain text, through the
//! configured relay. The [`Mailer`] trait is the seam the notifier talks to.

use crate::error::ExpireError;
use crate::models::Settings;
use anyhow::Result;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::{Message, SmtpTransport, Transport};

#[cfg_attr(test, mockall::automock)]
pub trait Mailer {
    /// Deliver one plain-text message to `to`
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Turn a configured recipient into a full address.
///
/// Bare login names (no `@`) are qualified with `domain`.
pub fn mail_address(recipient: &str, domain: &str) -> String {
    if recipient.contains('@') {
        recipient.to_string()
    } else {
        format!("{}@{}", recipient, domain)
    }
}

/// [`Mailer`] speaking plain SMTP to a relay
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    relay: String,
    from: String,
    domain: String,
}

impl SmtpMailer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            relay: settings.mail_server.clone(),
            from: format!(
                "{} <{}>",
                settings.from_name,
                mail_address(&settings.from_email, &settings.mail_domain)
            ),
            domain: settings.mail_domain.clone(),
        }
    }

    fn build(&self, to: &str, subject: &str, body: &str) -> Result<Message, ExpireError> {
        let fail = |reason: String| ExpireError::MailFailed {
            recipient: to.to_string(),
            reason,
        };

        let from: Mailbox = self.from.parse().map_err(|e| fail(format!("bad sender {}: {}", self.from, e)))?;
        let to_box: Mailbox = mail_address(to, &self.domain)
            .parse()
            .map_err(|e| fail(format!("bad recipient: {}", e)))?;

        Message::builder()
            .from(from)
            .to(to_box)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| fail(e.to_string()))
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = self.build(to, subject, body)?;

        // Unauthenticated, unencrypted relay on port 25, like a local MTA.
        let transport = SmtpTransport::builder_dangerous(self.relay.as_str()).build();
        transport.send(&message).map_err(|e| ExpireError::MailFailed {
            recipient: to.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!("Mailed {} via {}", to, self.relay);
        Ok(())
    }
}
