//! Session lifecycle and event ingestion
//!
//! A session is one live client connection. Opening it runs the per-consumer
//! setup of every pipeline; events posted to it then run through those
//! instances in the order they appear in the batch.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use lo_common::bus::PublishedState;
use lo_common::events::{Event, ServerMeta};
use lo_common::time::{now, now_seconds};
use lo_common::SessionMetadata;
use lo_reducers::doc_id::document_link_to_doc_id;
use lo_reducers::{ReducerFailure, ReducerOutput};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub student: String,
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(metadata): Json<SessionMetadata>,
) -> ApiResult<(StatusCode, Json<SessionCreated>)> {
    let set = state
        .registry
        .instantiate_all(Arc::clone(&state.kvs), &metadata);
    let session_id = Uuid::new_v4();
    let student = set.student().to_string();

    state.sessions.write().await.insert(session_id, Arc::new(set));
    info!("Opened session {} for {}", session_id, student);

    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id,
            student,
        }),
    ))
}

/// DELETE /api/sessions/:id
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    match state.sessions.write().await.remove(&session_id) {
        Some(_) => {
            info!("Closed session {}", session_id);
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::NotFound(format!("session {}", session_id))),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventBatch {
    pub events: Vec<Event>,
}

#[derive(Debug, Serialize)]
pub struct PublishedResponse {
    pub published: Vec<ReducerOutput>,
    /// Reducers that could not process an event in the batch
    pub failed: Vec<BatchFailure>,
}

/// A reducer failure, with the batch position of the event
#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    #[serde(flatten)]
    pub failure: ReducerFailure,
}

/// POST /api/sessions/:id/events
///
/// Events without a server timestamp are stamped on arrival. Every updated
/// external state is returned and broadcast on the publish bus. A reducer
/// failing on one event is reported in `failed`; the rest of the batch is
/// still processed.
pub async fn post_events(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(batch): Json<EventBatch>,
) -> ApiResult<Json<PublishedResponse>> {
    let set = state.session(session_id).await?;
    let mut published = Vec::new();
    let mut failed = Vec::new();

    for (index, mut event) in batch.events.into_iter().enumerate() {
        document_link_to_doc_id(&mut event);
        if event.server.is_none() {
            event.server = Some(ServerMeta {
                time: now_seconds(),
                extra: Map::new(),
            });
        }

        let outcome = set.process(&event).await?;
        for output in &outcome.published {
            let delivered = state.bus.emit(PublishedState {
                reducer: output.reducer.to_string(),
                key: output.key.clone(),
                state: output.state.clone(),
                timestamp: now(),
            });
            debug!("{} delivered to {} subscribers", output.key, delivered);
        }
        published.extend(outcome.published);
        failed.extend(
            outcome
                .failed
                .into_iter()
                .map(|failure| BatchFailure { index, failure }),
        );
    }

    if !failed.is_empty() {
        warn!(
            "Session {}: {} reducer failures in batch",
            session_id,
            failed.len()
        );
    }
    debug!("Session {}: {} states published", session_id, published.len());
    Ok(Json(PublishedResponse { published, failed }))
}
