use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::StoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// The store rejected the query.
    StoreClient(String),
    /// The store could not be reached or timed out.
    StoreUnavailable(String),
    Unexpected(String),
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Fatal(msg) => ApiError::StoreClient(msg),
            StoreError::Transient(msg) => ApiError::StoreUnavailable(msg),
            StoreError::Unexpected(msg) => ApiError::Unexpected(msg),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::StoreClient(msg) => {
                tracing::error!(error = %msg, "store client error");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("store client error: {msg}"))
            }
            ApiError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "store unavailable");
                (StatusCode::INTERNAL_SERVER_ERROR, "store service unavailable".to_string())
            }
            ApiError::Unexpected(msg) => {
                tracing::error!(error = %msg, "unexpected read api error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "an unexpected error occurred while retrieving data".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
