//! Frame — the wire envelope for every canvas event.
//!
//! ARCHITECTURE
//! ============
//! Every message exchanged over the canvas WebSocket is a Frame serialized as
//! one JSON text message. Clients send event frames (`draw_line`, `undo`, ...),
//! the coordinator answers with broadcast frames named after the outbound
//! event (`load_canvas`, `redraw_canvas`, ...).
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>` keyed by field name.
//! - Inbound frames are lenient: only `syscall` is required, the server fills
//!   in identity and timestamps.
//! - `from` is always stamped by the server with the originating connection.
//! - Error frames correlate to the offending frame via `parent_id`.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Frame data key for the retryable flag on error frames.
pub const FRAME_RETRYABLE: &str = "retryable";

/// Syscall used for protocol diagnostics sent back to one connection.
pub const GATEWAY_ERROR: &str = "gateway:error";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// Whether a frame carries an event or reports a problem with one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Request,
    Error,
}

/// The universal message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub from: Option<String>,
    pub syscall: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub data: Data,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error frames.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create an event frame. Entry point for every inbound and outbound event.
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create a structured error reply from a typed error.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::gateway_error(Some(self.id), err)
    }

    /// Create a `gateway:error` frame, optionally correlated to a request.
    #[must_use]
    pub fn gateway_error(parent_id: Option<Uuid>, err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Data::new();
        data.insert(FRAME_CODE.into(), serde_json::Value::String(err.error_code().to_string()));
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(err.to_string()));
        data.insert(FRAME_RETRYABLE.into(), serde_json::Value::Bool(err.retryable()));
        Self {
            id: Uuid::new_v4(),
            parent_id,
            ts: now_ms(),
            from: None,
            syscall: GATEWAY_ERROR.into(),
            status: Status::Error,
            data,
        }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Fill in fields a lenient inbound frame may have left at their defaults.
    #[must_use]
    pub fn stamped(mut self, from: impl Into<String>) -> Self {
        if self.ts == 0 {
            self.ts = now_ms();
        }
        self.from = Some(from.into());
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
