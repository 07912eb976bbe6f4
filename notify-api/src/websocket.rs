use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use notify_delivery::{Binding, ConnectionHandle, ConnectionRegistry};
use serde::Deserialize;
use std::sync::Arc;
use tracing;

use crate::auth::{authenticate_handshake, AuthenticatedUser};
use crate::server::ApiState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrades only authenticated handshakes; anything else is refused before
/// the socket exists.
pub async fn websocket_handler(
    Extension(state): Extension<ApiState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let secret = &state.ctx.config.server.jwt_secret;
    let user = match authenticate_handshake(query.token.as_deref(), &headers, secret) {
        Ok(user) => user,
        Err(status) => {
            tracing::debug!("Rejected WebSocket handshake: {}", status);
            return status.into_response();
        }
    };

    let buffer = state.ctx.config.server.ws_buffer_size;
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, user, registry, buffer))
}

async fn handle_socket(
    socket: WebSocket,
    user: AuthenticatedUser,
    registry: Arc<dyn ConnectionRegistry>,
    buffer: usize,
) {
    let (handle, mut outbound) = ConnectionHandle::new(user.user_id, buffer);
    let binding = Binding::new(registry, handle);
    let connection_id = binding.id();

    tracing::info!(
        conn_id = %connection_id,
        user_id = user.user_id,
        "WebSocket connection established"
    );

    let (mut sender, mut receiver) = socket.split();

    // Forward fan-out pushes to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(conn_id = %connection_id, "Failed to serialize push: {}", e);
                    continue;
                }
            };

            if let Err(e) = sender.send(Message::Text(text)).await {
                tracing::debug!(conn_id = %connection_id, "Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    // Clients never send application messages; read only to notice the close
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn_id = %connection_id, "WebSocket read error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    drop(binding);

    tracing::info!(
        conn_id = %connection_id,
        user_id = user.user_id,
        "WebSocket connection closed"
    );
}
