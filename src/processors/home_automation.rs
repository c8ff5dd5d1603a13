//! Home-automation processor: turns chat commands into API calls.
//!
//! A reference custom processor: it looks for a known command phrase in the
//! message body and forwards it to a home-automation HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, info, warn};

use super::Processor;
use crate::error::ProcessorError;
use crate::pipeline::types::CanonicalMessage;

/// Timeout for a single API call.
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// A recognised chat command and the API call it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub phrase: &'static str,
    pub method: &'static str,
    pub path: &'static str,
}

/// Commands in match priority order.
pub const COMMANDS: &[Command] = &[
    Command {
        phrase: "lights on",
        method: "POST",
        path: "lights/on",
    },
    Command {
        phrase: "lights off",
        method: "POST",
        path: "lights/off",
    },
    Command {
        phrase: "temperature",
        method: "GET",
        path: "sensors/temperature",
    },
    Command {
        phrase: "status",
        method: "GET",
        path: "status",
    },
];

/// First command whose phrase occurs in `body` (case-insensitive).
pub fn detect_command(body: &str) -> Option<&'static Command> {
    let body = body.trim().to_lowercase();
    COMMANDS.iter().find(|c| body.contains(c.phrase))
}

/// Forwards recognised commands to a home-automation API.
pub struct HomeAutomationProcessor {
    api_url: Option<String>,
    client: reqwest::Client,
}

impl HomeAutomationProcessor {
    /// With `api_url` unset, detected commands are only logged.
    pub fn new(api_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            api_url: api_url.map(|u| u.trim_end_matches('/').to_string()),
            client,
        }
    }

    async fn execute(
        &self,
        api_url: &str,
        command: &Command,
        message: &CanonicalMessage,
    ) -> Result<(), ProcessorError> {
        let url = format!("{api_url}/{}", command.path);
        let method = if command.method == "POST" {
            Method::POST
        } else {
            Method::GET
        };
        let mut request = self.client.request(method.clone(), &url);
        if method == Method::POST {
            request = request.json(&serde_json::json!({
                "command": command.phrase,
                "message_id": message.message_id,
                "wa_id": message.wa_id,
            }));
        }
        let response = request.send().await?.error_for_status()?;
        info!(
            command = command.phrase,
            status = response.status().as_u16(),
            "Home automation command executed"
        );
        Ok(())
    }
}

#[async_trait]
impl Processor for HomeAutomationProcessor {
    async fn process(&self, message: &CanonicalMessage) -> Result<bool, ProcessorError> {
        let Some(command) = message.body.as_deref().and_then(detect_command) else {
            debug!(message_id = %message.message_id, "No home automation command detected");
            return Ok(true);
        };

        info!(message_id = %message.message_id, command = command.phrase, "Detected command");

        let Some(api_url) = self.api_url.as_deref() else {
            info!(command = command.phrase, "No API configured, command logged only");
            return Ok(true);
        };

        match self.execute(api_url, command, message).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(command = command.phrase, error = %e, "Error executing command");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::MessageType;

    fn message(body: Option<&str>) -> CanonicalMessage {
        CanonicalMessage {
            wa_id: "1".into(),
            sender_name: None,
            message_id: "m1".into(),
            message_type: MessageType::Text,
            body: body.map(str::to_string),
            media_id: None,
            mime_type: None,
            filename: None,
            links: vec![],
            raw_headers: String::new(),
        }
    }

    #[test]
    fn detects_commands_case_insensitively() {
        assert_eq!(detect_command("Please turn LIGHTS ON").unwrap().path, "lights/on");
        assert_eq!(detect_command("lights off now").unwrap().path, "lights/off");
        assert_eq!(detect_command("what's the temperature?").unwrap().phrase, "temperature");
        assert!(detect_command("hello there").is_none());
    }

    #[test]
    fn earlier_command_wins() {
        assert_eq!(detect_command("status: lights on").unwrap().phrase, "lights on");
    }

    #[tokio::test]
    async fn no_command_is_success() {
        let p = HomeAutomationProcessor::new(None);
        assert!(p.process(&message(Some("just chatting"))).await.unwrap());
        assert!(p.process(&message(None)).await.unwrap());
    }

    #[tokio::test]
    async fn command_without_api_is_logged_only() {
        let p = HomeAutomationProcessor::new(None);
        assert!(p.process(&message(Some("lights on"))).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_api_declines() {
        // Port 9 (discard) on localhost is not listening in test environments.
        let p = HomeAutomationProcessor::new(Some("http://127.0.0.1:9/".into()));
        assert!(!p.process(&message(Some("status please"))).await.unwrap());
    }

    #[test]
    fn default_name() {
        assert_eq!(HomeAutomationProcessor::new(None).name(), "HomeAutomationProcessor");
    }
}
