//! Outbound mail over SMTP. Used by the relay's `/send-email`; like Twilio,
//! the mail credentials live with the relay only.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::core::errors::ChannelError;
use crate::core::state::RelaySettings;
use crate::io::email::EmailRequest;

/// Anything that can hand a message to a mail server. Returns the server's
/// acknowledgement.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, relay: &RelaySettings, mail: &EmailRequest) -> Result<String, ChannelError>;
}

/// STARTTLS submission with username/password (app password for Gmail).
pub struct SmtpMailer;

fn check_config(relay: &RelaySettings) -> Result<(), ChannelError> {
    for (key, value) in [
        ("relay.smtp_host", &relay.smtp_host),
        ("relay.smtp_username", &relay.smtp_username),
        ("relay.smtp_password", &relay.smtp_password),
    ] {
        if value.trim().is_empty() {
            return Err(ChannelError::ConfigurationMissing(key.to_string()));
        }
    }
    Ok(())
}

pub fn compose(relay: &RelaySettings, mail: &EmailRequest) -> Result<Message, ChannelError> {
    let sender = if relay.email_from.trim().is_empty() {
        relay.smtp_username.trim()
    } else {
        relay.email_from.trim()
    };
    let from: Mailbox = format!("EyesTalk <{}>", sender)
        .parse()
        .map_err(|e| ChannelError::ConfigurationMissing(format!("relay.email_from is not an address: {}", e)))?;
    let to: Mailbox = mail
        .to
        .trim()
        .parse()
        .map_err(|e| ChannelError::Rejected(format!("bad recipient {:?}: {}", mail.to, e)))?;
    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.text.clone())
        .map_err(|e| ChannelError::Rejected(format!("could not build message: {}", e)))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, relay: &RelaySettings, mail: &EmailRequest) -> Result<String, ChannelError> {
        check_config(relay)?;
        let message = compose(relay, mail)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(relay.smtp_host.trim())
            .map_err(|e| ChannelError::ConfigurationMissing(format!("relay.smtp_host: {}", e)))?
            .port(relay.smtp_port)
            .credentials(Credentials::new(
                relay.smtp_username.trim().to_string(),
                relay.smtp_password.trim().to_string(),
            ))
            .build();

        match transport.send(message).await {
            Ok(response) => Ok(format!(
                "{} {}",
                response.code(),
                response.message().next().unwrap_or_default()
            )),
            Err(e) if e.is_permanent() => Err(ChannelError::Rejected(format!("SMTP refused: {}", e))),
            Err(e) => Err(ChannelError::Transport(format!("SMTP: {}", e))),
        }
    }
}
