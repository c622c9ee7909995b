//! Coordinator — the single serialization point for canvas events.
//!
//! DESIGN
//! ======
//! Every inbound event (including transport-generated connect and
//! disconnect) becomes an `Event`. `apply` is pure business logic: it mutates
//! the `Session` and returns the `Delivery` list describing who gets what.
//! The async entry points take the session mutex, apply, and fan out through
//! the `Transport` before releasing it, so each client sees frames in exactly
//! the order the session changed.
//!
//! A connecting client is registered with the hub and sent its snapshot in
//! the same critical section. Any stroke is therefore either in the snapshot
//! or in a later `draw_line`, never both and never neither. A commit that
//! pushes the oldest strokes past the history limit redraws everyone instead,
//! so no client keeps a stroke the log has dropped.
//!
//! Live segments skip the session lock entirely. They carry no state, so
//! reordering or loss against other frames is acceptable.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame};
use crate::services::history::{Point, Stroke};
use crate::services::hub::Transport;
use crate::services::presence::Participant;
use crate::state::{AppState, Session};

// =============================================================================
// EVENT NAMES
// =============================================================================

pub const JOIN_ROOM: &str = "join_room";
pub const DRAW_LINE: &str = "draw_line";
pub const DRAWING_MOVE: &str = "drawing_move";
pub const UNDO: &str = "undo";
pub const REDO: &str = "redo";
pub const CLEAR: &str = "clear";

pub const LOAD_CANVAS: &str = "load_canvas";
pub const UPDATE_USERS: &str = "update_users";
pub const USER_JOINED: &str = "user_joined";
pub const REDRAW_CANVAS: &str = "redraw_canvas";
pub const CLEAR_CANVAS: &str = "clear_canvas";

const DEFAULT_NAME: &str = "Anonymous";
const DEFAULT_COLOR: &str = "#000000";

// =============================================================================
// TYPES
// =============================================================================

/// An in-progress segment relayed for visual feedback only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
    pub color: String,
    pub width: f64,
}

impl Segment {
    fn is_drawable(&self) -> bool {
        [self.from, self.to]
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite())
            && self.width.is_finite()
            && self.width > 0.0
    }
}

/// Everything the coordinator reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    Join { name: String, color: String },
    Commit(Stroke),
    Undo,
    Redo,
    Clear,
    Disconnect,
    LiveSegment(Segment),
}

/// Who receives an outbound frame, relative to the originating connection.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Only the originating connection.
    Origin(Frame),
    /// Every connection except the origin.
    Others(Frame),
    /// Every connection, origin included.
    All(Frame),
    /// Every connection except the origin; droppable for slow clients.
    Relay(Frame),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("malformed {event} payload: {reason}")]
    MalformedPayload { event: &'static str, reason: String },
}

impl crate::frame::ErrorCode for ProtocolError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "E_INVALID_JSON",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
            Self::MalformedPayload { .. } => "E_MALFORMED_PAYLOAD",
        }
    }
}

/// Point-in-time view of the whole session.
#[derive(Debug, Clone, Serialize)]
pub struct CanvasSnapshot {
    pub strokes: Vec<Stroke>,
    pub users: Vec<Participant>,
}

// =============================================================================
// DECODING
// =============================================================================

impl Event {
    /// Decode a client frame into an event.
    ///
    /// # Errors
    ///
    /// `UnknownEvent` for an unrecognised syscall, `MalformedPayload` when a
    /// `draw_line` or `drawing_move` payload does not have the expected shape.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        match frame.syscall.as_str() {
            JOIN_ROOM => Ok(Self::Join {
                name: data_str(&frame.data, "name").unwrap_or(DEFAULT_NAME).to_owned(),
                color: data_str(&frame.data, "color").unwrap_or(DEFAULT_COLOR).to_owned(),
            }),
            DRAW_LINE => decode_payload(DRAW_LINE, &frame.data).map(Self::Commit),
            DRAWING_MOVE => decode_payload(DRAWING_MOVE, &frame.data).map(Self::LiveSegment),
            UNDO => Ok(Self::Undo),
            REDO => Ok(Self::Redo),
            CLEAR => Ok(Self::Clear),
            other => Err(ProtocolError::UnknownEvent(other.to_owned())),
        }
    }
}

fn data_str<'a>(data: &'a Data, key: &str) -> Option<&'a str> {
    data.get(key).and_then(|v| v.as_str())
}

fn decode_payload<T: serde::de::DeserializeOwned>(event: &'static str, data: &Data) -> Result<T, ProtocolError> {
    let object: serde_json::Map<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| ProtocolError::MalformedPayload { event, reason: e.to_string() })
}

fn to_data(value: &impl Serialize) -> Data {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => Data::new(),
    }
}

fn strokes_frame(syscall: &str, strokes: &[Stroke]) -> Frame {
    Frame::request(syscall, Data::new()).with_data("strokes", serde_json::to_value(strokes).unwrap_or_default())
}

fn users_frame(users: &[Participant]) -> Frame {
    Frame::request(UPDATE_USERS, Data::new()).with_data("users", serde_json::to_value(users).unwrap_or_default())
}

// =============================================================================
// APPLY
// =============================================================================

/// Apply one event to the session and describe the resulting fan-out.
/// The caller must hold the session lock for the duration of the call and
/// of the delivery that follows.
pub fn apply(session: &mut Session, origin: Uuid, event: Event) -> Vec<Delivery> {
    let from = origin.to_string();
    match event {
        Event::Connect => {
            let strokes = session.history.snapshot();
            info!(connection_id = %origin, strokes = strokes.len(), "coordinator: sending snapshot");
            vec![Delivery::Origin(strokes_frame(LOAD_CANVAS, &strokes))]
        }
        Event::Join { name, color } => {
            let users = session.presence.join(origin, &name, &color);
            info!(connection_id = %origin, %name, users = users.len(), "coordinator: participant joined");
            vec![
                Delivery::All(users_frame(&users).with_from(from.clone())),
                Delivery::Others(
                    Frame::request(USER_JOINED, Data::new())
                        .with_from(from)
                        .with_data("name", name),
                ),
            ]
        }
        Event::Commit(stroke) => {
            let data = to_data(&stroke);
            match session.history.commit(stroke) {
                Ok(0) => {
                    info!(connection_id = %origin, strokes = session.history.len(), "coordinator: stroke committed");
                    vec![Delivery::Others(Frame::request(DRAW_LINE, data).with_from(from))]
                }
                Ok(evicted) => {
                    let strokes = session.history.snapshot();
                    info!(connection_id = %origin, strokes = strokes.len(), evicted, "coordinator: stroke committed, oldest evicted");
                    vec![Delivery::All(strokes_frame(REDRAW_CANVAS, &strokes).with_from(from))]
                }
                Err(e) => {
                    warn!(connection_id = %origin, error = %e, "coordinator: dropped malformed stroke");
                    Vec::new()
                }
            }
        }
        Event::Undo => {
            let result = session.history.undo();
            history_change(UNDO, origin, result, session.history.redo_len())
        }
        Event::Redo => {
            let result = session.history.redo();
            history_change(REDO, origin, result, session.history.redo_len())
        }
        Event::Clear => {
            let had_strokes = !session.history.is_empty();
            session.history.clear();
            info!(connection_id = %origin, had_strokes, "coordinator: canvas cleared");
            vec![Delivery::All(Frame::request(CLEAR_CANVAS, Data::new()).with_from(from))]
        }
        Event::Disconnect => {
            let users = session.presence.leave(origin);
            info!(connection_id = %origin, users = users.len(), "coordinator: participant left");
            vec![Delivery::All(users_frame(&users).with_from(from))]
        }
        Event::LiveSegment(segment) => relay_segment(origin, &segment),
    }
}

fn history_change(op: &str, origin: Uuid, result: Option<Vec<Stroke>>, redo: usize) -> Vec<Delivery> {
    let Some(strokes) = result else {
        debug!(connection_id = %origin, op, "coordinator: nothing to apply");
        return Vec::new();
    };
    info!(connection_id = %origin, op, strokes = strokes.len(), redo, "coordinator: history changed");
    vec![Delivery::All(
        strokes_frame(REDRAW_CANVAS, &strokes).with_from(origin.to_string()),
    )]
}

fn relay_segment(origin: Uuid, segment: &Segment) -> Vec<Delivery> {
    if !segment.is_drawable() {
        debug!(connection_id = %origin, "coordinator: dropped malformed segment");
        return Vec::new();
    }
    vec![Delivery::Relay(
        Frame::request(DRAWING_MOVE, to_data(segment)).with_from(origin.to_string()),
    )]
}

/// Hand each delivery to the transport in order.
pub async fn deliver<T: Transport + ?Sized>(transport: &T, origin: Uuid, deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        match delivery {
            Delivery::Origin(frame) => transport.unicast(origin, frame).await,
            Delivery::Others(frame) => transport.broadcast_others(origin, frame).await,
            Delivery::All(frame) => transport.broadcast_all(frame).await,
            Delivery::Relay(frame) => transport.relay_others(origin, frame).await,
        }
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Register a new connection and send it the current stroke log.
pub async fn connect(state: &AppState, connection_id: Uuid, tx: tokio::sync::mpsc::Sender<Frame>) {
    let mut session = state.session.lock().await;
    state.hub.register(connection_id, tx).await;
    let deliveries = apply(&mut session, connection_id, Event::Connect);
    deliver(&state.hub, connection_id, deliveries).await;
}

/// Process one client event.
pub async fn handle(state: &AppState, connection_id: Uuid, event: Event) {
    if let Event::LiveSegment(segment) = &event {
        let deliveries = relay_segment(connection_id, segment);
        deliver(&state.hub, connection_id, deliveries).await;
        return;
    }

    let mut session = state.session.lock().await;
    let deliveries = apply(&mut session, connection_id, event);
    deliver(&state.hub, connection_id, deliveries).await;
}

/// Remove a connection and tell everyone left who is still here.
pub async fn disconnect(state: &AppState, connection_id: Uuid) {
    let mut session = state.session.lock().await;
    state.hub.unregister(connection_id).await;
    let deliveries = apply(&mut session, connection_id, Event::Disconnect);
    deliver(&state.hub, connection_id, deliveries).await;
}

/// Read strokes and participants atomically.
pub async fn snapshot(state: &AppState) -> CanvasSnapshot {
    let session = state.session.lock().await;
    CanvasSnapshot { strokes: session.history.snapshot(), users: session.presence.list() }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
