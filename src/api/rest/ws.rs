use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::registry::Role;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ConnectParams {
    identity: Uuid,
    role: Role,
}

/// Attach a client connection. Identity verification happens upstream; by
/// the time the upgrade reaches us the (identity, role) pair is trusted.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.identity, params.role))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Uuid, role: Role) {
    let (mut sender, mut receiver) = socket.split();
    let outbox = state.registry.register(identity, role).await;

    info!(client = %identity, role = role.as_str(), "client connected");

    let mut frames = ReceiverStream::new(outbox);
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = frames.next().await {
            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize envelope for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.registry.unregister(identity, role).await;
    info!(client = %identity, "client disconnected");
}
