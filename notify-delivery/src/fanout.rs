use notify_core::Notification;
use std::sync::Arc;
use tracing;

use crate::handle::{PushError, ServerEvent};
use crate::registry::ConnectionRegistry;

/// Outcome of pushing one record to its owner's room.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

impl DeliveryReport {
    pub fn merge(self, other: DeliveryReport) -> DeliveryReport {
        DeliveryReport {
            delivered: self.delivered + other.delivered,
            dropped: self.dropped + other.dropped,
        }
    }
}

/// Pushes persisted records to every live connection of their owner.
///
/// Pushes are not acknowledged or retried. A record that misses a connection
/// is still in the store and shows up in the next history fetch.
#[derive(Clone)]
pub struct Fanout {
    registry: Arc<dyn ConnectionRegistry>,
}

impl Fanout {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.registry
    }

    pub fn deliver(&self, record: &Notification) -> DeliveryReport {
        let connections = self.registry.connections_for(record.user_id);
        let mut report = DeliveryReport::default();

        if connections.is_empty() {
            tracing::debug!(
                user_id = record.user_id,
                notification_id = record.id,
                "No live connections, notification kept for history"
            );
            return report;
        }

        for conn in connections {
            match conn.push(ServerEvent::Notification(record.clone())) {
                Ok(()) => report.delivered += 1,
                Err(PushError::Closed(id)) => {
                    tracing::debug!(conn_id = %id, user_id = record.user_id, "Skipping closed connection");
                    report.dropped += 1;
                }
                Err(PushError::Full(id)) => {
                    tracing::warn!(
                        conn_id = %id,
                        user_id = record.user_id,
                        notification_id = record.id,
                        "Connection buffer full, dropping push"
                    );
                    report.dropped += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ConnectionHandle;
    use crate::registry::RoomRegistry;
    use chrono::Utc;
    use notify_core::NotificationType;

    fn record(id: i64, user_id: i64) -> Notification {
        Notification {
            id,
            user_id,
            notification_type: NotificationType::Assigned,
            message: "You have been assigned".to_string(),
            related_id: "t1".to_string(),
            metadata: None,
            read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_offline_user_is_noop() {
        let fanout = Fanout::new(Arc::new(RoomRegistry::new()));
        assert_eq!(fanout.deliver(&record(1, 7)), DeliveryReport::default());
    }

    #[test]
    fn test_every_connection_gets_identical_record() {
        let registry = Arc::new(RoomRegistry::new());
        let (tab_one, mut rx1) = ConnectionHandle::new(7, 8);
        let (tab_two, mut rx2) = ConnectionHandle::new(7, 8);
        let (other, mut rx3) = ConnectionHandle::new(9, 8);
        registry.bind(tab_one);
        registry.bind(tab_two);
        registry.bind(other);

        let fanout = Fanout::new(registry);
        let sent = record(1, 7);
        let report = fanout.deliver(&sent);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);

        let first = rx1.try_recv().unwrap();
        let second = rx2.try_recv().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, ServerEvent::Notification(sent));
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_closed_connection_does_not_block_others() {
        let registry = Arc::new(RoomRegistry::new());
        let (stale, stale_rx) = ConnectionHandle::new(7, 8);
        let (live, mut live_rx) = ConnectionHandle::new(7, 8);
        registry.bind(stale);
        registry.bind(live);
        drop(stale_rx);

        let report = Fanout::new(registry).deliver(&record(1, 7));
        assert_eq!(report, DeliveryReport { delivered: 1, dropped: 1 });
        assert!(live_rx.try_recv().is_ok());
    }
}
