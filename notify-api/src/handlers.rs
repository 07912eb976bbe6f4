use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use notify_core::{Notification, NotificationId, StoreError, HISTORY_LIMIT};
use serde_json::{json, Value};
use tracing;

use crate::auth::AuthenticatedUser;
use crate::server::ApiState;

fn store_failure(e: StoreError) -> StatusCode {
    tracing::error!("Notification store error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

pub async fn health(Extension(state): Extension<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "notify-api",
        "connections": state.registry.connection_count(),
    }))
}

/// Most recent notifications of the caller, newest first.
pub async fn get_notifications(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Notification>>, StatusCode> {
    let notifications = state
        .ctx
        .store
        .list_recent(user.user_id, HISTORY_LIMIT)
        .await
        .map_err(store_failure)?;

    Ok(Json(notifications))
}

pub async fn mark_notification_read(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, StatusCode> {
    let notification_id: NotificationId = id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    // Another user's record answers exactly like a missing one
    match state
        .ctx
        .store
        .mark_read(user.user_id, notification_id)
        .await
        .map_err(store_failure)?
    {
        Some(notification) => Ok(Json(notification)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

pub async fn mark_all_read(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, StatusCode> {
    let updated = state
        .ctx
        .store
        .mark_all_read(user.user_id)
        .await
        .map_err(store_failure)?;

    Ok(Json(json!({
        "message": "All notifications marked as read",
        "updated": updated,
    })))
}

pub async fn clear_notifications(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, StatusCode> {
    let deleted = state
        .ctx
        .store
        .clear_all(user.user_id)
        .await
        .map_err(store_failure)?;

    tracing::debug!(user_id = user.user_id, deleted, "Cleared notifications");

    Ok(Json(json!({
        "message": "Notifications cleared",
        "deleted": deleted,
    })))
}

pub async fn get_unread_count(
    Extension(state): Extension<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, StatusCode> {
    let unread = state
        .ctx
        .store
        .unread_count(user.user_id)
        .await
        .map_err(store_failure)?;

    Ok(Json(json!({ "unread": unread })))
}
