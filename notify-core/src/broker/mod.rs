//! The pub/sub channel between producer services and the consumer.
//!
//! Delivery is broadcast: every live subscriber sees every message published
//! after it subscribed, and nothing is kept for subscribers that are offline.

mod memory;
mod redis;

pub use self::memory::MemoryBroker;
pub use self::redis::RedisBroker;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BrokerResult;

/// Raw message payloads as received from the channel.
pub type PayloadStream = BoxStream<'static, Vec<u8>>;

#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Fire-and-forget publish. Succeeds even if nobody is subscribed.
    async fn publish(&self, payload: &[u8]) -> BrokerResult<()>;

    /// Opens a subscription. The stream ends when the underlying connection
    /// is lost; callers are expected to subscribe again.
    async fn subscribe(&self) -> BrokerResult<PayloadStream>;

    fn channel(&self) -> &str;
}
