//! Email notification for messages that contain links.
//!
//! SMTP delivery goes through lettre; the transport sits behind
//! [`NotificationTransport`] so the processor can run against a fake.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use super::Processor;
use crate::config::SmtpConfig;
use crate::error::ProcessorError;
use crate::pipeline::types::CanonicalMessage;

/// Outbound channel for notification text.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Whether the transport has everything it needs to send.
    fn is_configured(&self) -> bool;

    /// Deliver one notification.
    async fn send(&self, subject: &str, body: &str) -> Result<(), ProcessorError>;
}

// ── SMTP transport ──────────────────────────────────────────────────

/// SMTP delivery with STARTTLS and login credentials.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    pub fn recipient(&self) -> &str {
        &self.config.to_address
    }
}

#[async_trait]
impl NotificationTransport for SmtpNotifier {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), ProcessorError> {
        let config = self.config.clone();
        let subject = subject.to_string();
        let body = body.to_string();

        tokio::task::spawn_blocking(move || send_blocking(&config, &subject, body))
            .await
            .map_err(|e| ProcessorError::Transport(format!("SMTP task panicked: {e}")))?
    }
}

/// Send one plain-text email (blocking, run it in spawn_blocking).
fn send_blocking(config: &SmtpConfig, subject: &str, body: String) -> Result<(), ProcessorError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::starttls_relay(&config.host)
        .map_err(|e| ProcessorError::Transport(format!("SMTP relay error: {e}")))?
        .port(config.port)
        .credentials(creds)
        .build();

    let email = Message::builder()
        .from(
            config
                .from_address
                .parse()
                .map_err(|e| ProcessorError::Transport(format!("Invalid from address: {e}")))?,
        )
        .to(config
            .to_address
            .parse()
            .map_err(|e| ProcessorError::Transport(format!("Invalid to address: {e}")))?)
        .subject(subject)
        .body(body)
        .map_err(|e| ProcessorError::Transport(format!("Failed to build email: {e}")))?;

    transport
        .send(&email)
        .map_err(|e| ProcessorError::Transport(format!("SMTP send failed: {e}")))?;

    info!(to = %config.to_address, "Notification email sent");
    Ok(())
}

// ── Processor ───────────────────────────────────────────────────────

/// Emails a summary of every message that contains at least one link.
pub struct EmailNotificationProcessor {
    transport: Arc<dyn NotificationTransport>,
}

impl EmailNotificationProcessor {
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Self {
        Self { transport }
    }

    /// Processor backed by SMTP.
    pub fn smtp(config: SmtpConfig) -> Self {
        Self::new(Arc::new(SmtpNotifier::new(config)))
    }
}

#[async_trait]
impl Processor for EmailNotificationProcessor {
    fn name(&self) -> &str {
        "EmailNotificationProcessor"
    }

    async fn process(&self, message: &CanonicalMessage) -> Result<bool, ProcessorError> {
        if !message.has_links() {
            debug!(message_id = %message.message_id, "No links found, nothing to notify");
            return Ok(true);
        }

        if !self.transport.is_configured() {
            warn!(
                message_id = %message.message_id,
                "Notification transport not configured, skipping send"
            );
            return Ok(false);
        }

        let (subject, body) = render_notification(message);
        match self.transport.send(&subject, &body).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(message_id = %message.message_id, error = %e, "Failed to send notification");
                Ok(false)
            }
        }
    }
}

/// Build the notification subject and plain-text body.
pub fn render_notification(message: &CanonicalMessage) -> (String, String) {
    let sender = message.sender_name.as_deref().unwrap_or("Unknown");
    let wa_id = if message.wa_id.is_empty() {
        "N/A"
    } else {
        message.wa_id.as_str()
    };

    let subject = format!("WhatsApp Link from {sender}");
    let body = format!(
        "WhatsApp Message Details:\n\
         --------------------------\n\
         From: {sender} ({wa_id})\n\
         Message Type: {}\n\
         Message Body: {}\n\
         \n\
         Links Found:\n\
         {}\n\
         \n\
         Message ID: {}\n",
        message.message_type,
        message.body.as_deref().unwrap_or("N/A"),
        message.links_joined(),
        message.message_id,
    );
    (subject, body)
}
