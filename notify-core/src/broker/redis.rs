use async_trait::async_trait;
use futures::StreamExt;
use redis::Client;
use std::sync::Arc;
use tracing;

use super::{EventBroker, PayloadStream};
use crate::config::BrokerConfig;
use crate::db::mask_url;
use crate::error::BrokerResult;

/// Redis `PUBLISH`/`SUBSCRIBE` on a single channel.
#[derive(Clone)]
pub struct RedisBroker {
    client: Arc<Client>,
    channel: String,
}

impl RedisBroker {
    pub async fn connect(config: &BrokerConfig) -> anyhow::Result<Self> {
        tracing::info!("Setting up Redis broker");
        tracing::info!("Redis URL: {}", mask_url(&config.url));

        let client = Client::open(config.url.as_str())
            .map_err(|e| anyhow::anyhow!("Failed to create Redis client: {}", e))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to ping Redis: {}", e))?;

        tracing::info!("Redis connection established, channel: {}", config.channel);

        Ok(Self {
            client: Arc::new(client),
            channel: config.channel.clone(),
        })
    }
}

#[async_trait]
impl EventBroker for RedisBroker {
    async fn publish(&self, payload: &[u8]) -> BrokerResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        tracing::debug!(channel = %self.channel, receivers, "Published event");
        Ok(())
    }

    async fn subscribe(&self) -> BrokerResult<PayloadStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        tracing::info!("Subscribed to channel: {}", self.channel);

        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec());

        Ok(stream.boxed())
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}
