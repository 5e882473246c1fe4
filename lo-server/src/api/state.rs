//! Out-of-band state queries
//!
//! Dashboards and query code read reducer state here without going through a
//! session: the key is rebuilt from the pipeline's scope and the query
//! parameters.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use lo_common::time::now_seconds;
use lo_reducers::activity::{determine_activity_status, ActivityReport, ActivityStatus};
use lo_reducers::{KeyDict, KeyField, KeyStateType, PipelineFactory};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ApiError, ApiResult, AppState};

/// Key field values for a state lookup
#[derive(Debug, Default, Deserialize)]
pub struct StateQuery {
    pub student: Option<String>,
    pub doc_id: Option<String>,
}

/// Build the key dictionary `pipeline`'s scope needs from the query
fn key_dict_for(pipeline: &dyn PipelineFactory, query: &StateQuery) -> ApiResult<KeyDict> {
    let mut dict = KeyDict::new();
    for field in pipeline.scope().fields() {
        let value = match field {
            KeyField::Student => query.student.as_deref(),
            KeyField::Event(name) if name == "doc_id" => query.doc_id.as_deref(),
            KeyField::Event(name) => {
                return Err(ApiError::BadRequest(format!(
                    "key field '{}' cannot be queried",
                    name
                )))
            }
        };
        let value = value.ok_or_else(|| {
            ApiError::BadRequest(format!(
                "{} is scoped on '{}'",
                pipeline.reducer_name(),
                field.name()
            ))
        })?;
        dict.insert(field.clone(), value);
    }
    Ok(dict)
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub reducer: &'static str,
    pub key: String,
    pub state: Value,
}

/// GET /api/state/:reducer?student=..&doc_id=..
pub async fn get_state(
    State(state): State<AppState>,
    Path(reducer): Path<String>,
    Query(query): Query<StateQuery>,
) -> ApiResult<Json<StateResponse>> {
    let pipeline = state.registry.get(&reducer)?;
    let dict = key_dict_for(pipeline.as_ref(), &query)?;
    let key = pipeline.key_for(&dict, KeyStateType::External);

    let value = pipeline
        .read_external_json(state.kvs.as_ref(), &dict)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no state under {}", key)))?;

    Ok(Json(StateResponse {
        reducer: pipeline.reducer_name(),
        key,
        state: value,
    }))
}

/// GET /api/activity?student=..&doc_id=..
///
/// Active while the last time-on-task event is within the activity
/// threshold. A student with no recorded events is inactive.
pub async fn get_activity(
    State(state): State<AppState>,
    Query(query): Query<StateQuery>,
) -> ApiResult<Json<ActivityReport>> {
    let pipeline = state.registry.get("time_on_task")?;
    let dict = key_dict_for(pipeline.as_ref(), &query)?;

    let last_seen = pipeline
        .read_external_json(state.kvs.as_ref(), &dict)
        .await?
        .and_then(|s| s.get("last_seen_timestamp").and_then(Value::as_f64));

    let report = match last_seen {
        Some(last) => determine_activity_status(
            last,
            now_seconds(),
            state.settings.activity_threshold as f64,
        ),
        None => ActivityReport {
            status: ActivityStatus::Inactive,
        },
    };
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct KeysResponse {
    pub keys: Vec<String>,
}

/// GET /api/keys
pub async fn list_keys(State(state): State<AppState>) -> ApiResult<Json<KeysResponse>> {
    let keys = state.kvs.keys().await?;
    Ok(Json(KeysResponse { keys }))
}

#[derive(Debug, Serialize)]
pub struct ReducerStats {
    pub reducer: &'static str,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub sessions: usize,
    pub reducers: Vec<ReducerStats>,
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let reducers = state
        .registry
        .iter()
        .map(|p| ReducerStats {
            reducer: p.reducer_name(),
            hits: p.performance().hits(),
            misses: p.performance().misses(),
        })
        .collect();

    Json(StatsResponse {
        sessions: state.sessions.read().await.len(),
        reducers,
    })
}
