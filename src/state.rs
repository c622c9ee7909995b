//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the single canvas `Session` behind one mutex, the `Hub` of
//! connected clients, and the parsed configuration. Every operation that
//! reads or mutates the session takes the mutex for its whole duration,
//! including the fan-out of the frames it produces.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::services::history::History;
use crate::services::hub::Hub;
use crate::services::presence::Presence;

// =============================================================================
// SESSION
// =============================================================================

/// The session state triple: stroke log, redo stack, and participants.
/// Always read and mutated as one unit.
#[derive(Debug, Default)]
pub struct Session {
    pub history: History,
    pub presence: Presence,
}

impl Session {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self { history: History::new(config.limits), presence: Presence::new() }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub hub: Hub,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { session: Arc::new(Mutex::new(Session::new(&config))), hub: Hub::new(), config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
