use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use tempo_store::{LogRecord, Statistics};

use super::LimitQuery;
use crate::app::AppState;
use crate::error::ApiResult;

/// GET /logs, newest first.
pub async fn all_logs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<LogRecord>> {
    Ok(Json(state.store.logs(q.limit())?))
}

/// GET /schedulers/{id}/logs. An unknown ID yields an empty list.
pub async fn scheduler_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<LogRecord>> {
    Ok(Json(state.store.scheduler_logs(&id, q.limit())?))
}

/// GET /stats
pub async fn statistics(State(state): State<Arc<AppState>>) -> ApiResult<Statistics> {
    Ok(Json(state.store.statistics()?))
}
