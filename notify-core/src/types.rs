use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type NotificationId = i64;

/// Closed set of notification kinds producers may publish.
///
/// The task and team services still publish the older `TASK_*`/`TEAM_ADDED`
/// names, so those are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    #[serde(alias = "TASK_ASSIGNED")]
    Assigned,
    #[serde(alias = "TASK_UPDATED")]
    Updated,
    CommentAdded,
    #[serde(alias = "TEAM_ADDED")]
    MembershipAdded,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Assigned => "ASSIGNED",
            NotificationType::Updated => "UPDATED",
            NotificationType::CommentAdded => "COMMENT_ADDED",
            NotificationType::MembershipAdded => "MEMBERSHIP_ADDED",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSIGNED" | "TASK_ASSIGNED" => Ok(NotificationType::Assigned),
            "UPDATED" | "TASK_UPDATED" => Ok(NotificationType::Updated),
            "COMMENT_ADDED" => Ok(NotificationType::CommentAdded),
            "MEMBERSHIP_ADDED" | "TEAM_ADDED" => Ok(NotificationType::MembershipAdded),
            other => Err(format!("unknown notification type: {}", other)),
        }
    }
}

/// Message published by producers on the broker channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub user_ids: Vec<UserId>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub related_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Producer-assigned nonce; makes redelivery of the same event idempotent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl EventMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Target users in first-seen order, duplicates removed.
    pub fn recipients(&self) -> Vec<UserId> {
        let mut seen = HashSet::with_capacity(self.user_ids.len());
        self.user_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }

    pub fn dedup_key(&self) -> Option<String> {
        let event_id = self.event_id.as_deref()?;
        let mut hasher = Sha256::new();
        hasher.update(event_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.notification_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.related_id.as_bytes());
        Some(hex::encode(hasher.finalize()))
    }

    /// One pending record per distinct recipient.
    pub fn to_new_notifications(&self) -> Vec<NewNotification> {
        let dedup_key = self.dedup_key();
        self.recipients()
            .into_iter()
            .map(|user_id| NewNotification {
                user_id,
                notification_type: self.notification_type,
                message: self.message.clone(),
                related_id: self.related_id.clone(),
                metadata: self.metadata.clone(),
                dedup_key: dedup_key.clone(),
            })
            .collect()
    }
}

/// A record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub notification_type: NotificationType,
    pub message: String,
    pub related_id: String,
    pub metadata: Option<serde_json::Value>,
    pub dedup_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub related_id: String,
    pub metadata: Option<serde_json::Value>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
