//! Error types for the relay.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Pub/sub transport errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    #[error("Failed to subscribe to channel {channel}: {reason}")]
    Subscribe { channel: String, reason: String },

    #[error("Failed to publish to channel {channel}: {reason}")]
    Publish { channel: String, reason: String },

    #[error("Subscription to {channel} closed")]
    Closed { channel: String },

    #[error("Undecodable payload: {0}")]
    Payload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Faults raised by a processor while handling a message.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Processor {name} failed: {reason}")]
    Failed { name: String, reason: String },

    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Processor {name} panicked: {reason}")]
    Panicked { name: String, reason: String },
}

/// Errors surfaced by the webhook endpoint.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
