use notify_core::{EventMessage, NotificationStore, NotifyContext, StoreError};
use notify_delivery::{DeliveryReport, Fanout};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing;

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("Malformed event message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Store write failed: {0}")]
    Store(#[from] StoreError),

    #[error("Store write timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Distinct target users in the event.
    pub recipients: usize,
    /// Records actually written; lower than `recipients` on redelivery.
    pub created: usize,
    pub delivery: DeliveryReport,
}

/// Turns broker events into stored records and live pushes.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    fanout: Fanout,
    write_timeout: Duration,
}

impl NotificationService {
    pub fn new(ctx: &NotifyContext, fanout: Fanout) -> Self {
        Self::with_parts(ctx.store.clone(), fanout, ctx.config.database.write_timeout())
    }

    pub fn with_parts(
        store: Arc<dyn NotificationStore>,
        fanout: Fanout,
        write_timeout: Duration,
    ) -> Self {
        Self {
            store,
            fanout,
            write_timeout,
        }
    }

    pub async fn process_payload(&self, payload: &[u8]) -> Result<ProcessOutcome, ConsumeError> {
        let event = EventMessage::parse(payload)?;
        self.process_event(&event).await
    }

    pub async fn process_event(&self, event: &EventMessage) -> Result<ProcessOutcome, ConsumeError> {
        let pending = event.to_new_notifications();
        if pending.is_empty() {
            tracing::debug!(
                notification_type = %event.notification_type,
                related_id = %event.related_id,
                "Event has no target users, nothing to store"
            );
            return Ok(ProcessOutcome::default());
        }

        let recipients = pending.len();
        let created = tokio::time::timeout(self.write_timeout, self.store.insert_many(pending))
            .await
            .map_err(|_| ConsumeError::Timeout(self.write_timeout))??;

        // Each record is pushed on its own; one user's connections can't
        // affect another user's delivery.
        let delivery = created
            .iter()
            .map(|record| self.fanout.deliver(record))
            .fold(DeliveryReport::default(), DeliveryReport::merge);

        tracing::debug!(
            notification_type = %event.notification_type,
            related_id = %event.related_id,
            recipients,
            created = created.len(),
            delivered = delivery.delivered,
            "Processed notification event"
        );

        Ok(ProcessOutcome {
            recipients,
            created: created.len(),
            delivery,
        })
    }
}
