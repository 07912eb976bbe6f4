use std::sync::Arc;

use crate::broker::{EventBroker, MemoryBroker, RedisBroker};
use crate::config::{BrokerBackend, Config, StoreBackend};
use crate::db::{create_pool, run_migrations};
use crate::store::{MemoryNotificationStore, NotificationStore, PgNotificationStore};

/// Shared handles passed to every service in the process.
#[derive(Clone)]
pub struct NotifyContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn NotificationStore>,
    pub broker: Arc<dyn EventBroker>,
}

impl NotifyContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn NotificationStore> = match config.database.backend {
            StoreBackend::Postgres => {
                run_migrations(&config.database.url).await?;
                let pool = create_pool(&config.database).await?;
                Arc::new(PgNotificationStore::new(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory notification store, records are lost on restart");
                Arc::new(MemoryNotificationStore::new())
            }
        };

        let broker: Arc<dyn EventBroker> = match config.broker.backend {
            BrokerBackend::Redis => Arc::new(RedisBroker::connect(&config.broker).await?),
            BrokerBackend::Memory => {
                tracing::warn!("Using in-process broker, external producers cannot publish");
                Arc::new(MemoryBroker::new(config.broker.channel.clone()))
            }
        };

        Ok(Self::from_parts(config, store, broker))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn NotificationStore>,
        broker: Arc<dyn EventBroker>,
    ) -> Self {
        NotifyContext {
            config: Arc::new(config),
            store,
            broker,
        }
    }
}
