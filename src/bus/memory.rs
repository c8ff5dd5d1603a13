//! In-process bus over a tokio broadcast channel.
//!
//! Used by tests and single-process setups that run without Redis.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use super::{MessagePublisher, MessageSource, PayloadStream, encode};
use crate::error::BusError;
use crate::pipeline::types::CanonicalMessage;

const DEFAULT_CAPACITY: usize = 256;

pub struct MemoryBus {
    channel: String,
    tx: Mutex<broadcast::Sender<String>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new(channel: impl Into<String>) -> Self {
        Self::with_capacity(channel, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(channel: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            channel: channel.into(),
            tx: Mutex::new(tx),
            capacity,
        }
    }

    fn sender(&self) -> broadcast::Sender<String> {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Publish a payload as-is, bypassing encoding.
    pub fn publish_raw(&self, payload: impl Into<String>) -> usize {
        self.sender().send(payload.into()).unwrap_or(0)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender().receiver_count()
    }

    /// End every open subscription, as a dropped connection would.
    /// Later calls to `subscribe` work normally.
    pub fn disconnect(&self) {
        let (tx, _) = broadcast::channel(self.capacity);
        let old = std::mem::replace(
            &mut *self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
            tx,
        );
        drop(old);
    }
}

#[async_trait]
impl MessagePublisher for MemoryBus {
    async fn publish(&self, message: &CanonicalMessage) -> Result<(), BusError> {
        let payload = encode(message)?;
        // No subscribers is not an error, matching Redis PUBLISH.
        let _ = self.sender().send(payload);
        Ok(())
    }
}

#[async_trait]
impl MessageSource for MemoryBus {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn subscribe(&self) -> Result<PayloadStream, BusError> {
        let rx = self.sender().subscribe();
        let channel = self.channel.clone();
        let stream = futures::stream::unfold(rx, move |mut rx| {
            let channel = channel.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => return Some((Ok(payload), rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %channel, skipped, "Subscriber lagged, messages skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
