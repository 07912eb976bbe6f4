use anyhow::Result;
use futures::StreamExt;
use notify_core::broker::PayloadStream;
use notify_core::NotifyContext;
use notify_delivery::Fanout;
use std::time::{Duration, Instant};
use tracing;

use crate::service::{ConsumeError, NotificationService};

const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Subscribes to the notification channel and processes messages one at a
/// time for the lifetime of the process.
pub async fn run(ctx: NotifyContext, fanout: Fanout) -> Result<()> {
    tracing::info!("Starting notification consumer");

    let service = NotificationService::new(&ctx, fanout);
    let channel = ctx.broker.channel().to_string();

    let mut error_count = 0u32;
    let mut last_error_log: Option<Instant> = None;

    loop {
        match ctx.broker.subscribe().await {
            Ok(stream) => {
                error_count = 0;
                tracing::info!("Listening for events on channel: {}", channel);

                let processed = consume(&service, stream).await;
                tracing::warn!(
                    processed,
                    "Subscription to {} ended, resubscribing",
                    channel
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => {
                error_count += 1;
                // Only log errors every 30 seconds to reduce log spam
                if last_error_log.map_or(true, |t| t.elapsed() >= ERROR_LOG_INTERVAL) {
                    tracing::warn!(
                        "Error subscribing to {} (error count: {}): {}",
                        channel,
                        error_count,
                        e
                    );
                    last_error_log = Some(Instant::now());
                }
                tokio::time::sleep(backoff(error_count)).await;
            }
        }
    }
}

/// Drains one subscription. Returns the number of messages seen once the
/// stream ends.
pub async fn consume(service: &NotificationService, mut stream: PayloadStream) -> usize {
    let mut processed = 0;
    while let Some(payload) = stream.next().await {
        handle_payload(service, &payload).await;
        processed += 1;
    }
    processed
}

async fn handle_payload(service: &NotificationService, payload: &[u8]) {
    match service.process_payload(payload).await {
        Ok(outcome) => {
            tracing::debug!(
                created = outcome.created,
                delivered = outcome.delivery.delivered,
                "Processed notification event"
            );
        }
        Err(ConsumeError::Malformed(e)) => {
            tracing::warn!(
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "Dropping malformed event message"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to store notifications, event lost");
        }
    }
}

/// 1s, 2s, 4s, ... capped at 30s.
fn backoff(error_count: u32) -> Duration {
    let exponent = error_count.saturating_sub(1).min(5);
    Duration::from_secs(1 << exponent).min(MAX_BACKOFF)
}
