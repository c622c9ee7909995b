//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection ID and enters a `select!` loop:
//! - Incoming client frames → parse + decode into an `Event` → coordinator
//! - Frames queued for this connection by the hub → forward to client
//!
//! This layer only does protocol translation. Every state change and every
//! fan-out decision belongs to the coordinator.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `connection_id`
//! 2. Register with the coordinator → `load_canvas` snapshot is queued
//! 3. Client sends frames → decode → coordinator applies and broadcasts
//! 4. Close, socket error, or hub eviction → coordinator disconnect → `update_users`

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame, Status};
use crate::services::coordinator::{self, DRAWING_MOVE, Event, ProtocolError};
use crate::state::AppState;

pub const SESSION_CONNECTED: &str = "session:connected";

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();

    // Per-connection channel for frames fanned out by the hub.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_channel_capacity);

    let welcome = Frame::request(SESSION_CONNECTED, Data::new()).with_data("connection_id", connection_id.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    coordinator::connect(&state, connection_id, client_tx).await;
    let clients = state.hub.len().await;
    info!(%connection_id, clients, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, connection_id, &text).await;
                        if send_all(&mut socket, &replies).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = client_rx.recv() => {
                // Sender dropped by the hub; the client reconnects for a fresh snapshot.
                let Some(frame) = frame else {
                    warn!(%connection_id, "ws: evicted by hub, closing");
                    break;
                };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    // Abrupt or clean, every exit path is a leave.
    coordinator::disconnect(&state, connection_id).await;
    info!(%connection_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Broadcasts are queued through the hub; only protocol errors come back
/// here, so tests can drive dispatch without a socket.
async fn process_inbound_text(state: &AppState, connection_id: Uuid, text: &str) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%connection_id, error = %e, "ws: invalid inbound frame");
            return vec![Frame::gateway_error(None, &ProtocolError::InvalidJson(e))];
        }
    };

    // Origin is always the socket, whatever the client claims.
    let req = req.stamped(connection_id.to_string());

    if req.syscall != DRAWING_MOVE {
        info!(%connection_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");
    }

    match Event::from_frame(&req) {
        Ok(event) => {
            coordinator::handle(state, connection_id, event).await;
            vec![]
        }
        Err(e @ ProtocolError::MalformedPayload { .. }) => {
            warn!(%connection_id, syscall = %req.syscall, error = %e, "ws: dropped malformed payload");
            vec![]
        }
        Err(e) => vec![req.error_from(&e)],
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_all(socket: &mut WebSocket, frames: &[Frame]) -> Result<(), ()> {
    for frame in frames {
        send_frame(socket, frame).await?;
    }
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.syscall != DRAWING_MOVE {
        if frame.status == Status::Error {
            let code = frame
                .data
                .get("code")
                .and_then(|v| v.as_str())
                .unwrap_or("-");
            let message = frame
                .data
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("-");
            warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
        } else {
            info!(id = %frame.id, syscall = %frame.syscall, "ws: send frame");
        }
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
