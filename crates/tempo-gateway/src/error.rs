use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tempo_scheduler::SchedulerError;
use tempo_store::DbError;
use tracing::error;

/// Error returned by every API handler, rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::NotFound => "Scheduler not found".to_string(),
            ApiError::Internal(msg) => {
                error!("request failed: {msg}");
                msg
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { .. } => ApiError::NotFound,
            DbError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::JobNotFound { .. } => ApiError::NotFound,
            SchedulerError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
