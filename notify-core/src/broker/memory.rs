use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing;

use super::{EventBroker, PayloadStream};
use crate::error::BrokerResult;

const DEFAULT_CAPACITY: usize = 1024;

/// In-process broadcast channel for single-node deployments and tests.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    channel: String,
    sender: broadcast::Sender<Vec<u8>>,
}

impl MemoryBroker {
    pub fn new(channel: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            channel: channel.into(),
            sender,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl EventBroker for MemoryBroker {
    async fn publish(&self, payload: &[u8]) -> BrokerResult<()> {
        // No receivers is not an error for a broadcast channel.
        let _ = self.sender.send(payload.to_vec());
        Ok(())
    }

    async fn subscribe(&self) -> BrokerResult<PayloadStream> {
        let receiver = self.sender.subscribe();
        let channel = self.channel.clone();

        let stream = stream::unfold(receiver, move |mut receiver| {
            let channel = channel.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(payload) => return Some((payload, receiver)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}
