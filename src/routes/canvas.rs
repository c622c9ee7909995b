//! Read-only canvas endpoint.

use axum::Json;
use axum::extract::State;

use crate::services::coordinator::{self, CanvasSnapshot};
use crate::state::AppState;

/// `GET /api/canvas` — strokes and participants, read atomically.
pub async fn get_canvas(State(state): State<AppState>) -> Json<CanvasSnapshot> {
    Json(coordinator::snapshot(&state).await)
}
