use anyhow::Result;
use notify_api::run as run_api;
use notify_consumer::run as run_consumer;
use notify_core::{Config, NotifyContext};
use notify_delivery::{ConnectionRegistry, Fanout, RoomRegistry};
use std::sync::Arc;
use tokio;
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting notification service");

    // Load configuration
    let config = Config::from_env();
    let ctx = NotifyContext::new(config).await?;

    tracing::info!("Notification context initialized");

    let registry: Arc<dyn ConnectionRegistry> = Arc::new(RoomRegistry::new());
    let fanout = Fanout::new(registry.clone());

    let ctx_clone = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = run_consumer(ctx_clone, fanout).await {
            tracing::error!("Notification consumer error: {}", e);
        }
    });

    // API server runs in main task
    run_api(ctx, registry).await?;

    Ok(())
}
