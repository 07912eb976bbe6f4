use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::sync::Arc;

use super::NotificationStore;
use crate::db::{DbConnection, DbPool};
use crate::error::{StoreError, StoreResult};
use crate::schema::notifications;
use crate::types::{NewNotification, Notification, NotificationId, UserId};

#[derive(Queryable, Selectable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct NotificationRow {
    id: i64,
    user_id: i64,
    notification_type: String,
    message: String,
    related_id: String,
    metadata: Option<serde_json::Value>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let notification_type = row
            .notification_type
            .parse()
            .map_err(|reason| StoreError::Corrupt { id: row.id, reason })?;

        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            notification_type,
            message: row.message,
            related_id: row.related_id,
            metadata: row.metadata,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = notifications)]
struct NewNotificationRow {
    user_id: i64,
    notification_type: String,
    message: String,
    related_id: String,
    metadata: Option<serde_json::Value>,
    dedup_key: Option<String>,
}

impl From<NewNotification> for NewNotificationRow {
    fn from(n: NewNotification) -> Self {
        NewNotificationRow {
            user_id: n.user_id,
            notification_type: n.notification_type.as_str().to_string(),
            message: n.message,
            related_id: n.related_id,
            metadata: n.metadata,
            dedup_key: n.dedup_key,
        }
    }
}

fn into_notifications(rows: Vec<NotificationRow>) -> StoreResult<Vec<Notification>> {
    rows.into_iter().map(Notification::try_from).collect()
}

pub struct PgNotificationStore {
    pool: Arc<DbPool>,
}

impl PgNotificationStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<DbConnection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert_many(&self, records: Vec<NewNotification>) -> StoreResult<Vec<Notification>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<NewNotificationRow> = records.into_iter().map(Into::into).collect();
        let mut conn = self.conn().await?;

        let inserted: Vec<NotificationRow> = diesel::insert_into(notifications::table)
            .values(&rows)
            .on_conflict_do_nothing()
            .returning(NotificationRow::as_returning())
            .get_results(&mut conn)
            .await?;

        if inserted.len() < rows.len() {
            tracing::debug!(
                skipped = rows.len() - inserted.len(),
                "Skipped already persisted notifications"
            );
        }

        into_notifications(inserted)
    }

    async fn list_recent(&self, user_id: UserId, limit: i64) -> StoreResult<Vec<Notification>> {
        let mut conn = self.conn().await?;

        let rows: Vec<NotificationRow> = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .limit(limit)
            .select(NotificationRow::as_select())
            .load(&mut conn)
            .await?;

        into_notifications(rows)
    }

    async fn mark_read(&self, user_id: UserId, id: NotificationId) -> StoreResult<Option<Notification>> {
        let mut conn = self.conn().await?;

        let row: Option<NotificationRow> = diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::user_id.eq(user_id)),
        )
        .set(notifications::read.eq(true))
        .returning(NotificationRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()?;

        row.map(Notification::try_from).transpose()
    }

    async fn mark_all_read(&self, user_id: UserId) -> StoreResult<usize> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::read.eq(false)),
        )
        .set(notifications::read.eq(true))
        .execute(&mut conn)
        .await?;

        Ok(updated)
    }

    async fn clear_all(&self, user_id: UserId) -> StoreResult<usize> {
        let mut conn = self.conn().await?;

        let deleted = diesel::delete(notifications::table.filter(notifications::user_id.eq(user_id)))
            .execute(&mut conn)
            .await?;

        Ok(deleted)
    }

    async fn unread_count(&self, user_id: UserId) -> StoreResult<i64> {
        let mut conn = self.conn().await?;

        let count = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::read.eq(false))
            .count()
            .get_result(&mut conn)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, StoreBackend};
    use crate::db::{create_pool, run_migrations};
    use crate::types::NotificationType;

    // Needs a reachable Postgres: DATABASE_URL=... cargo test -- --ignored
    async fn store() -> PgNotificationStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        run_migrations(&url).await.unwrap();
        let pool = create_pool(&DatabaseConfig {
            backend: StoreBackend::Postgres,
            url,
            max_connections: 2,
            write_timeout_ms: 5000,
        })
        .await
        .unwrap();
        PgNotificationStore::new(pool)
    }

    /// User ids unlikely to collide with other runs against the same database.
    fn fresh_user_id() -> UserId {
        -(Utc::now().timestamp_nanos_opt().unwrap_or_default().abs() % 1_000_000_000_000)
    }

    fn pending(user_id: UserId, dedup_key: Option<&str>) -> NewNotification {
        NewNotification {
            user_id,
            notification_type: NotificationType::CommentAdded,
            message: "New comment".to_string(),
            related_id: "t1".to_string(),
            metadata: Some(serde_json::json!({ "commenterName": "Bo" })),
            dedup_key: dedup_key.map(str::to_string),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_conflicting_dedup_key_is_skipped() {
        let store = store().await;
        let user_id = fresh_user_id();

        let first = store
            .insert_many(vec![pending(user_id, Some("k1")), pending(user_id, None)])
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = store
            .insert_many(vec![pending(user_id, Some("k1")), pending(user_id - 1, Some("k1"))])
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].user_id, user_id - 1);

        let history = store.list_recent(user_id, 50).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].metadata, Some(serde_json::json!({ "commenterName": "Bo" })));

        store.clear_all(user_id).await.unwrap();
        store.clear_all(user_id - 1).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_mark_read_is_scoped_to_owner() {
        let store = store().await;
        let owner = fresh_user_id();
        let other = owner - 1;

        let record = store.insert_many(vec![pending(owner, None)]).await.unwrap().remove(0);

        assert!(store.mark_read(other, record.id).await.unwrap().is_none());
        assert_eq!(store.unread_count(owner).await.unwrap(), 1);

        let updated = store.mark_read(owner, record.id).await.unwrap().unwrap();
        assert!(updated.read);
        assert_eq!(store.unread_count(owner).await.unwrap(), 0);
        assert_eq!(store.mark_all_read(owner).await.unwrap(), 0);

        assert_eq!(store.clear_all(owner).await.unwrap(), 1);
        assert!(store.list_recent(owner, 50).await.unwrap().is_empty());
    }
}
