use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Mutex;

use super::NotificationStore;
use crate::error::StoreResult;
use crate::types::{NewNotification, Notification, NotificationId, UserId};

#[derive(Default)]
struct MemoryState {
    next_id: NotificationId,
    records: Vec<Notification>,
    dedup_keys: HashSet<(UserId, String)>,
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct MemoryNotificationStore {
    state: Mutex<MemoryState>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert_many(&self, records: Vec<NewNotification>) -> StoreResult<Vec<Notification>> {
        let mut state = self.lock();
        let created_at = Utc::now();
        let mut inserted = Vec::with_capacity(records.len());

        for record in records {
            if let Some(key) = &record.dedup_key {
                if !state.dedup_keys.insert((record.user_id, key.clone())) {
                    continue;
                }
            }

            state.next_id += 1;
            let notification = Notification {
                id: state.next_id,
                user_id: record.user_id,
                notification_type: record.notification_type,
                message: record.message,
                related_id: record.related_id,
                metadata: record.metadata,
                read: false,
                created_at,
            };
            state.records.push(notification.clone());
            inserted.push(notification);
        }

        Ok(inserted)
    }

    async fn list_recent(&self, user_id: UserId, limit: i64) -> StoreResult<Vec<Notification>> {
        let state = self.lock();
        let mut records: Vec<Notification> = state
            .records
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn mark_read(&self, user_id: UserId, id: NotificationId) -> StoreResult<Option<Notification>> {
        let mut state = self.lock();
        Ok(state
            .records
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    async fn mark_all_read(&self, user_id: UserId) -> StoreResult<usize> {
        let mut state = self.lock();
        let mut updated = 0;
        for n in state.records.iter_mut().filter(|n| n.user_id == user_id && !n.read) {
            n.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn clear_all(&self, user_id: UserId) -> StoreResult<usize> {
        let mut state = self.lock();
        let before = state.records.len();
        state.records.retain(|n| n.user_id != user_id);
        Ok(before - state.records.len())
    }

    async fn unread_count(&self, user_id: UserId) -> StoreResult<i64> {
        let state = self.lock();
        Ok(state
            .records
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count() as i64)
    }
}
