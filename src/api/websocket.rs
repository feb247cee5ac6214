//! WebSocket handler for real-time dashboard updates

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::api::state::ApiState;
use crate::events::DASHBOARD_TOPIC;

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Send the `initial_data` snapshot, then forward every dashboard event until either side
/// goes away
async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    // subscribe before the snapshot so nothing published in between is lost
    let mut events = state.events.subscribe(DASHBOARD_TOPIC).await;

    match state.snapshot().await.map(|data| serde_json::to_string(&data)) {
        Ok(Ok(text)) => {
            if sender.send(Message::Text(text)).await.is_err() {
                debug!("client left before the initial data was sent");
                return;
            }
        }
        Ok(Err(e)) => error!("failed to serialize initial data: {e}"),
        Err(e) => error!("failed to load initial data: {e}"),
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagging, skipped {skipped} event(s)");
                    continue;
                }
                Err(RecvError::Closed) => {
                    debug!("event channel closed");
                    break;
                }
            };

            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("failed to serialize {}: {e}", event.kind());
                    continue;
                }
            };

            if sender.send(Message::Text(text)).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // client messages are ignored; only close ends the session
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket client disconnected");
}
