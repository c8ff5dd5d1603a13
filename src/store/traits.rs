//! `MessageStore` trait: async interface for message persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::pipeline::types::CanonicalMessage;

/// Result of inserting a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New row, with its row id.
    Inserted(i64),
    /// A row with the same `message_id` already exists; nothing was written.
    Duplicate,
}

/// A persisted inbound WhatsApp message.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub wa_id: String,
    pub sender_name: Option<String>,
    pub message_id: String,
    pub message_type: String,
    pub message_body: Option<String>,
    pub media_id: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub links: String,
    pub headers: String,
    pub timestamp: DateTime<Utc>,
}

/// Backend-agnostic message store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert a message unless one with the same `message_id` exists.
    async fn insert_message(&self, message: &CanonicalMessage)
    -> Result<InsertOutcome, DatabaseError>;

    /// Look up a message by its WhatsApp message id.
    async fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>, DatabaseError>;

    /// All stored messages in insertion order.
    async fn list_messages(&self) -> Result<Vec<StoredMessage>, DatabaseError>;
}
