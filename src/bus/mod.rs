//! Pub/sub channel carrying canonical messages from the webhook to subscribers.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BusError;
use crate::pipeline::types::CanonicalMessage;

pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;

/// Stream of raw payloads from one subscription.
///
/// An `Err` item is a payload that could not be read; the end of the stream
/// means the subscription was lost.
pub type PayloadStream = BoxStream<'static, Result<String, BusError>>;

/// Publishing side of the channel.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// JSON-encode `message` in its wire shape and publish it.
    async fn publish(&self, message: &CanonicalMessage) -> Result<(), BusError>;
}

/// Subscribing side of the channel.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Channel name, for logging.
    fn channel(&self) -> &str;

    /// Open a fresh subscription.
    async fn subscribe(&self) -> Result<PayloadStream, BusError>;
}

/// Wire encoding shared by every publisher.
pub fn encode(message: &CanonicalMessage) -> Result<String, BusError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode one wire payload.
pub fn decode(payload: &str) -> Result<CanonicalMessage, BusError> {
    Ok(serde_json::from_str(payload)?)
}
