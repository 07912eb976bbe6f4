use chrono::{DateTime, Utc};
use notify_core::{Notification, UserId};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Frames pushed from the server to a live connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Notification(Notification),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PushError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("connection {0} outbound buffer is full")]
    Full(ConnectionId),
}

/// Sending half of one authenticated live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    /// Creates a handle and the receiver the socket writer drains.
    pub fn new(user_id: UserId, buffer: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            user_id,
            connected_at: Utc::now(),
            sender,
        };
        (handle, receiver)
    }

    /// Queues an event without waiting for the client.
    pub fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full(self.id),
            mpsc::error::TrySendError::Closed(_) => PushError::Closed(self.id),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
