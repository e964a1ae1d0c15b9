use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, mut socket: WebSocket) {
    let client_id = Uuid::new_v4();
    // Subscribe before registering so nothing emitted after the gauge counts us is lost.
    let mut rx = state.sink.subscribe();
    state.clients.insert(client_id, Utc::now());
    info!(client = %client_id, clients = state.clients.len(), "Push client connected");

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(emission) => {
                    let text = match serde_json::to_string(&emission) {
                        Ok(t) => t,
                        Err(e) => {
                            warn!(event = %emission.event, error = %e, "Failed to encode emission");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(client = %client_id, skipped, "Push client lagging, skipped messages");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Downstream clients only listen; anything they send is ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    state.clients.remove(&client_id);
    info!(client = %client_id, clients = state.clients.len(), "Push client disconnected");
}
