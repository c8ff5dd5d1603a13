//! Long-running subscriber: channel payloads → `Dispatcher`.
//!
//! Subscribes to a `MessageSource`, decodes every payload into a
//! `CanonicalMessage` and dispatches it. A lost subscription is retried
//! forever after a fixed delay; only the shutdown future stops the loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::bus::{MessageSource, decode};
use crate::config::DEFAULT_RECONNECT_DELAY;
use crate::error::BusError;
use crate::pipeline::Dispatcher;

/// Counters for one `Subscriber::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages decoded and dispatched.
    pub dispatched: u64,
    /// Payloads dropped because they could not be read or decoded.
    pub dropped: u64,
    /// Subscriptions lost or refused.
    pub faults: u64,
}

pub struct Subscriber {
    dispatcher: Arc<Dispatcher>,
    source: Arc<dyn MessageSource>,
    reconnect_delay: Duration,
}

impl Subscriber {
    pub fn new(dispatcher: Arc<Dispatcher>, source: Arc<dyn MessageSource>) -> Self {
        Self {
            dispatcher,
            source,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Listen until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();
        let mut attempt: u32 = 0;

        let processors = self.dispatcher.len().await;
        info!(channel = %self.source.channel(), processors, "Subscriber starting");

        loop {
            let fault = tokio::select! {
                _ = &mut shutdown => break,
                fault = self.session(&mut summary, &mut attempt) => fault,
            };

            summary.faults += 1;
            attempt += 1;
            error!(
                channel = %self.source.channel(),
                attempt,
                error = %fault,
                "Subscription lost, reconnecting in {}s",
                self.reconnect_delay.as_secs_f32()
            );

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(
            channel = %self.source.channel(),
            dispatched = summary.dispatched,
            dropped = summary.dropped,
            "Subscriber stopped"
        );
        summary
    }

    /// One subscription, consumed until it fails. Always returns the fault.
    async fn session(&self, summary: &mut RunSummary, attempt: &mut u32) -> BusError {
        let mut stream = match self.source.subscribe().await {
            Ok(stream) => stream,
            Err(e) => return e,
        };

        if *attempt > 0 {
            info!(channel = %self.source.channel(), attempts = *attempt, "Reconnected");
        }
        *attempt = 0;
        info!(channel = %self.source.channel(), "Listening for messages");

        while let Some(item) = stream.next().await {
            let payload = match item {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Dropping unreadable payload");
                    summary.dropped += 1;
                    continue;
                }
            };

            match decode(&payload) {
                Ok(message) => {
                    debug!(message_id = %message.message_id, "Received message");
                    self.dispatcher.dispatch(&message).await;
                    summary.dispatched += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable message");
                    summary.dropped += 1;
                }
            }
        }

        BusError::Closed {
            channel: self.source.channel().to_string(),
        }
    }
}
