//! Redis pub/sub transport.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{MessagePublisher, MessageSource, PayloadStream, encode};
use crate::config::RedisConfig;
use crate::error::BusError;
use crate::pipeline::types::CanonicalMessage;

/// Redis-backed publisher and subscription source for one channel.
///
/// Publishing reuses a lazily opened multiplexed connection, dropped and
/// reopened after an error. Each subscription gets its own connection.
pub struct RedisBus {
    client: redis::Client,
    channel: String,
    target: String,
    publish_conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBus {
    /// Build a client; no connection is opened until first use.
    pub fn new(config: &RedisConfig) -> Result<Self, BusError> {
        let target = config.display_target();
        let client =
            redis::Client::open(config.connection_url()).map_err(|e| BusError::Connect {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            channel: config.channel.clone(),
            target,
            publish_conn: Mutex::new(None),
        })
    }

    /// Connect and PING, so startup fails fast on a bad address.
    pub async fn ping(&self) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.connect_error(e))?;
        info!(target = %self.target, "Connected to Redis");
        Ok(())
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BusError> {
        let mut guard = self.publish_conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| self.connect_error(e))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    fn connect_error(&self, e: redis::RedisError) -> BusError {
        BusError::Connect {
            target: self.target.clone(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl MessagePublisher for RedisBus {
    async fn publish(&self, message: &CanonicalMessage) -> Result<(), BusError> {
        let payload = encode(message)?;
        let mut conn = self.connection().await?;

        match conn.publish::<_, _, i64>(&self.channel, payload).await {
            Ok(receivers) => {
                debug!(
                    channel = %self.channel,
                    message_id = %message.message_id,
                    receivers,
                    "Published message"
                );
                Ok(())
            }
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Publish failed, dropping connection");
                *self.publish_conn.lock().await = None;
                Err(BusError::Publish {
                    channel: self.channel.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl MessageSource for RedisBus {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn subscribe(&self) -> Result<PayloadStream, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| self.connect_error(e))?;

        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| BusError::Subscribe {
                channel: self.channel.clone(),
                reason: e.to_string(),
            })?;

        info!(channel = %self.channel, "Subscribed to Redis channel");

        let stream = pubsub.into_on_message().map(|msg| {
            msg.get_payload::<String>()
                .map_err(|e| BusError::Payload(e.to_string()))
        });
        Ok(Box::pin(stream))
    }
}
