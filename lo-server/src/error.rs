//! Error types for lo-server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Reducer engine error
    #[error(transparent)]
    Reducer(#[from] lo_reducers::Error),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] lo_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        use lo_common::Error as StoreError;
        use lo_reducers::Error as ReducerError;
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Reducer(ReducerError::UnknownReducer(_)) => (StatusCode::NOT_FOUND, "UNKNOWN_REDUCER"),
            ApiError::Reducer(ReducerError::MalformedEvent(_) | ReducerError::Reconstruct(_)) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_EVENT")
            }
            ApiError::Reducer(ReducerError::Store(StoreError::Unavailable(_)))
            | ApiError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            ApiError::Reducer(ReducerError::Store(_)) | ApiError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
            ApiError::Reducer(_) => (StatusCode::INTERNAL_SERVER_ERROR, "REDUCER_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
