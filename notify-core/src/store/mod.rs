//! Durable per-user notification records.
//!
//! Every read or mutation is scoped by the caller's user id. A record owned by
//! someone else is indistinguishable from one that does not exist.

mod memory;
mod postgres;

pub use memory::MemoryNotificationStore;
pub use postgres::PgNotificationStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{NewNotification, Notification, NotificationId, UserId};

/// Number of records returned by a history fetch.
pub const HISTORY_LIMIT: i64 = 50;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts all records of one event in a single write.
    ///
    /// Records whose `(user_id, dedup_key)` already exists are skipped and
    /// left out of the returned list.
    async fn insert_many(&self, records: Vec<NewNotification>) -> StoreResult<Vec<Notification>>;

    /// Newest first, at most `limit` records.
    async fn list_recent(&self, user_id: UserId, limit: i64) -> StoreResult<Vec<Notification>>;

    /// Returns `None` when the record is missing or owned by another user.
    async fn mark_read(&self, user_id: UserId, id: NotificationId) -> StoreResult<Option<Notification>>;

    /// Returns how many records flipped from unread to read.
    async fn mark_all_read(&self, user_id: UserId) -> StoreResult<usize>;

    /// Returns how many records were deleted.
    async fn clear_all(&self, user_id: UserId) -> StoreResult<usize>;

    async fn unread_count(&self, user_id: UserId) -> StoreResult<i64>;
}
