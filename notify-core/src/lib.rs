pub mod broker;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use broker::{EventBroker, MemoryBroker, RedisBroker};
pub use config::Config;
pub use context::NotifyContext;
pub use db::DbPool;
pub use error::{BrokerError, StoreError};
pub use store::{MemoryNotificationStore, NotificationStore, PgNotificationStore, HISTORY_LIMIT};
pub use types::{EventMessage, NewNotification, Notification, NotificationId, NotificationType, UserId};
