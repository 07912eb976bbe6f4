use anyhow::Result;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderValue, Request, Uri},
    middleware,
    routing::{get, patch},
    Router,
};
use notify_core::NotifyContext;
use notify_delivery::ConnectionRegistry;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing;

use crate::auth;
use crate::handlers;
use crate::websocket;

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: NotifyContext,
    pub registry: Arc<dyn ConnectionRegistry>,
}

impl ApiState {
    pub fn new(ctx: NotifyContext, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { ctx, registry }
    }
}

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    match origins {
        Some(origins) => {
            let mut cors = CorsLayer::new();
            for origin in origins {
                if let Ok(parsed) = origin.parse::<HeaderValue>() {
                    cors = cors.allow_origin(parsed);
                }
            }
            cors.allow_methods(Any).allow_headers(Any)
        }
        None => {
            tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
            CorsLayer::permissive()
        }
    }
}

/// Path plus query with the `token` value masked, for request logs.
fn loggable_uri(uri: &Uri) -> String {
    let path = uri.path();
    let query = match uri.query() {
        Some(query) => query,
        None => return path.to_string(),
    };

    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("token", _)) => "token=****".to_string(),
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", path, masked.join("&"))
}

fn request_span(req: &Request<Body>) -> tracing::Span {
    tracing::debug_span!(
        "request",
        method = %req.method(),
        uri = %loggable_uri(req.uri()),
        version = ?req.version(),
    )
}

pub fn router(state: ApiState) -> Router {
    let cors = cors_layer(state.ctx.config.server.cors_origins.as_deref());

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(websocket::websocket_handler))
        .route(
            "/api/notifications",
            get(handlers::get_notifications).delete(handlers::clear_notifications),
        )
        .route("/api/notifications/unread-count", get(handlers::get_unread_count))
        .route("/api/notifications/read-all", patch(handlers::mark_all_read))
        .route("/api/notifications/:id/read", patch(handlers::mark_notification_read))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(cors)
                .layer(Extension(state))
                .layer(middleware::from_fn(auth::auth_middleware)),
        )
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

pub async fn run(ctx: NotifyContext, registry: Arc<dyn ConnectionRegistry>) -> Result<()> {
    let host: std::net::IpAddr = ctx.config.server.host.parse()?;
    let addr = SocketAddr::new(host, ctx.config.server.api_port);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Starting API server on {}", listener.local_addr()?);

    serve(listener, ApiState::new(ctx, registry), shutdown_signal()).await?;

    tracing::info!("API server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_token;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use notify_core::{
        Config, MemoryBroker, MemoryNotificationStore, NewNotification, Notification,
        NotificationStore, NotificationType,
    };
    use notify_delivery::RoomRegistry;
    use serde_json::Value;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn state() -> (ApiState, Arc<MemoryNotificationStore>) {
        let store = Arc::new(MemoryNotificationStore::new());
        let ctx = NotifyContext::from_parts(
            Config::in_memory(SECRET),
            store.clone(),
            Arc::new(MemoryBroker::new("notifications")),
        );
        (ApiState::new(ctx, Arc::new(RoomRegistry::new())), store)
    }

    async fn seed(store: &MemoryNotificationStore, user_id: i64, message: &str) -> Notification {
        store
            .insert_many(vec![NewNotification {
                user_id,
                notification_type: NotificationType::Assigned,
                message: message.to_string(),
                related_id: "t1".to_string(),
                metadata: None,
                dedup_key: None,
            }])
            .await
            .unwrap()
            .remove(0)
    }

    async fn call(state: &ApiState, method: &str, uri: &str, user_id: Option<i64>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            let token = generate_token(user_id, "MEMBER", SECRET, 3600).unwrap();
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = router(state.clone())
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (state, _) = state();
        let (status, body) = call(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_requires_token() {
        let (state, _) = state();
        let (status, _) = call(&state, "GET", "/api/notifications", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_loggable_uri_masks_token() {
        let uri: Uri = "/ws?token=eyJhbGciOi.secret.sig".parse().unwrap();
        assert_eq!(loggable_uri(&uri), "/ws?token=****");

        let uri: Uri = "/ws?lang=en&token=abc&x=1".parse().unwrap();
        assert_eq!(loggable_uri(&uri), "/ws?lang=en&token=****&x=1");

        let uri: Uri = "/api/notifications".parse().unwrap();
        assert_eq!(loggable_uri(&uri), "/api/notifications");
    }

    #[tokio::test]
    async fn test_user_service_token_without_expiry_reaches_history() {
        let (state, store) = state();
        seed(&store, 7, "hello").await;

        let claims = serde_json::json!({ "id": 7, "role": "MEMBER" });
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_ref())).unwrap();

        let request = Request::builder()
            .uri("/api/notifications")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body[0]["message"], "hello");
    }

    #[tokio::test]
    async fn test_ws_prefixed_paths_are_not_public() {
        let (state, _) = state();
        let (status, _) = call(&state, "GET", "/wsadmin", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_history_is_scoped_to_caller() {
        let (state, store) = state();
        seed(&store, 7, "for seven").await;
        seed(&store, 9, "for nine").await;

        let (status, body) = call(&state, "GET", "/api/notifications", Some(7)).await;
        assert_eq!(status, StatusCode::OK);
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["message"], "for seven");
        assert_eq!(records[0]["userId"], 7);
        assert_eq!(records[0]["read"], false);
    }

    #[tokio::test]
    async fn test_mark_read_ownership() {
        let (state, store) = state();
        let record = seed(&store, 7, "x").await;
        let uri = format!("/api/notifications/{}/read", record.id);

        let (status, _) = call(&state, "PATCH", &uri, Some(9)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&state, "PATCH", "/api/notifications/999/read", Some(7)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&state, "PATCH", "/api/notifications/abc/read", Some(7)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&state, "PATCH", &uri, Some(7)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["read"], true);

        let (_, history) = call(&state, "GET", "/api/notifications", Some(7)).await;
        assert_eq!(history[0]["id"], record.id);
        assert_eq!(history[0]["read"], true);
        assert_eq!(history[0]["userId"], 7);
    }

    #[tokio::test]
    async fn test_read_all_count_and_clear() {
        let (state, store) = state();
        seed(&store, 7, "a").await;
        seed(&store, 7, "b").await;
        seed(&store, 9, "c").await;

        let (_, body) = call(&state, "GET", "/api/notifications/unread-count", Some(7)).await;
        assert_eq!(body["unread"], 2);

        let (status, body) = call(&state, "PATCH", "/api/notifications/read-all", Some(7)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 2);

        let (_, body) = call(&state, "PATCH", "/api/notifications/read-all", Some(7)).await;
        assert_eq!(body["updated"], 0);

        let (_, body) = call(&state, "GET", "/api/notifications/unread-count", Some(9)).await;
        assert_eq!(body["unread"], 1);

        let (status, body) = call(&state, "DELETE", "/api/notifications", Some(7)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 2);

        let (_, history) = call(&state, "GET", "/api/notifications", Some(7)).await;
        assert!(history.as_array().unwrap().is_empty());
        let (_, history) = call(&state, "GET", "/api/notifications", Some(9)).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
    }
}
