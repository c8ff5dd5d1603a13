//! Structured-log processor: writes a short summary of each message.

use async_trait::async_trait;
use tracing::info;

use super::Processor;
use crate::error::ProcessorError;
use crate::pipeline::types::CanonicalMessage;

/// Maximum number of body characters included in the log line.
pub const MAX_BODY_LENGTH: usize = 50;

/// Logs every message; never fails.
#[derive(Debug, Default)]
pub struct LoggingProcessor;

impl LoggingProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Processor for LoggingProcessor {
    async fn process(&self, message: &CanonicalMessage) -> Result<bool, ProcessorError> {
        let links = message.links_joined();
        let links = if links.is_empty() { "None".to_string() } else { links };
        info!(
            message_id = %message.message_id,
            from = message.sender_name.as_deref().unwrap_or("Unknown"),
            wa_id = %message.wa_id,
            message_type = %message.message_type,
            body = %truncate_body(message.body.as_deref().unwrap_or("N/A"), MAX_BODY_LENGTH),
            links = %links,
            "Message received"
        );
        Ok(true)
    }
}

/// Cut `body` to `max` characters, appending `...` when anything was dropped.
pub fn truncate_body(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
