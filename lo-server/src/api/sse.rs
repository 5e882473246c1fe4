//! Server-Sent Events stream of published reducer state

use axum::{extract::State, response::IntoResponse};
use lo_common::sse::published_state_stream;

use crate::AppState;

/// GET /api/published/stream
///
/// Every external state published after the client connects.
pub async fn published_stream(State(state): State<AppState>) -> impl IntoResponse {
    published_state_stream(&state.bus, "lo-server")
}
