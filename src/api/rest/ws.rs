use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tracing::info;

use crate::auth::{Caller, Role};
use crate::bus::ORDER_ACCEPTED_CHANNEL;
use crate::error::AppError;
use crate::state::AppState;

/// Streams accepted orders to admin dashboards.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    caller: Caller,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    caller.require(Role::Admin)?;
    Ok(ws.on_upgrade(|socket| handle_socket(socket, state)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut accepted = state.broker.subscribe(ORDER_ACCEPTED_CHANNEL);

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(payload) = accepted.next().await {
            if sender.send(Message::Text(payload)).await.is_err() {
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

    info!("websocket client disconnected");
}
