//! lo-server library - event ingestion service
//!
//! Owns one set of pipeline instances per live client session, runs every
//! incoming event through them and broadcasts the published states to
//! dashboard subscribers.

use axum::Router;
use lo_common::bus::PublishBus;
use lo_common::config::WritingObserverSettings;
use lo_common::kvs::Kvs;
use lo_reducers::{PipelineSet, ReducerRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub mod api;
pub mod error;

pub use error::{ApiError, ApiResult};

/// Published states buffered per slow SSE subscriber
const BUS_CAPACITY: usize = 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ReducerRegistry>,
    pub kvs: Arc<dyn Kvs>,
    /// Live sessions and their pipeline instances
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<PipelineSet>>>>,
    pub bus: Arc<PublishBus>,
    pub settings: Arc<WritingObserverSettings>,
}

impl AppState {
    /// Create new application state with the writing-analysis reducers
    pub fn new(kvs: Arc<dyn Kvs>, settings: WritingObserverSettings) -> Self {
        Self {
            registry: Arc::new(ReducerRegistry::writing_observer(&settings)),
            kvs,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            bus: Arc::new(PublishBus::new(BUS_CAPACITY)),
            settings: Arc::new(settings),
        }
    }

    /// Pipeline instances for a live session
    pub async fn session(&self, id: Uuid) -> ApiResult<Arc<PipelineSet>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{delete, get, post};

    Router::new()
        .route("/api/sessions", post(api::create_session))
        .route("/api/sessions/:id", delete(api::close_session))
        .route("/api/sessions/:id/events", post(api::post_events))
        .route("/api/state/:reducer", get(api::get_state))
        .route("/api/activity", get(api::get_activity))
        .route("/api/keys", get(api::list_keys))
        .route("/api/stats", get(api::get_stats))
        .route("/api/published/stream", get(api::published_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
