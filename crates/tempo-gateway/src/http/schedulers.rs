use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tempo_store::{SchedulerCreate, SchedulerRecord, SchedulerUpdate};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};

fn load(state: &AppState, id: &str) -> Result<SchedulerRecord, ApiError> {
    state.store.get_scheduler(id)?.ok_or(ApiError::NotFound)
}

/// GET /schedulers
pub async fn list_schedulers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SchedulerRecord>> {
    let records = state.store.list_schedulers()?;
    Ok(Json(
        records
            .into_iter()
            .map(|r| state.with_live_times(r))
            .collect(),
    ))
}

/// GET /schedulers/{id}
pub async fn get_scheduler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<SchedulerRecord> {
    let record = load(&state, &id)?;
    Ok(Json(state.with_live_times(record)))
}

/// POST /schedulers
///
/// The job is registered with the engine first so that an invalid trigger
/// never reaches the database.
pub async fn create_scheduler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SchedulerCreate>,
) -> ApiResult<SchedulerRecord> {
    body.validate()?;
    let id = uuid::Uuid::new_v4().to_string();
    let mut record = body.into_record(id, Utc::now());

    let snapshot = state.engine.add(record.to_job())?;
    record.next_run = snapshot.next_run;

    if let Err(e) = state.store.insert_scheduler(&record) {
        let _ = state.engine.remove(&record.id);
        return Err(e.into());
    }
    info!(scheduler_id = %record.id, name = %record.name, "scheduler created");
    Ok(Json(record))
}

/// PUT /schedulers/{id}
pub async fn update_scheduler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SchedulerUpdate>,
) -> ApiResult<SchedulerRecord> {
    let current = load(&state, &id)?;
    let mut merged = body.apply(&current)?;

    let registered = state.engine.contains(&id);
    if current.trigger_differs(&merged) || !registered {
        let snapshot = state.schedule(&merged)?;
        merged.next_run = snapshot.next_run;
    } else if current.is_active != merged.is_active {
        let snapshot = if merged.is_active {
            state.engine.resume(&id)?
        } else {
            state.engine.pause(&id)?
        };
        merged.next_run = snapshot.next_run;
    }

    let saved = state.store.save_scheduler(&merged)?;
    info!(scheduler_id = %id, "scheduler updated");
    Ok(Json(state.with_live_times(saved)))
}

/// DELETE /schedulers/{id}
pub async fn delete_scheduler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if let Err(e) = state.engine.remove(&id) {
        warn!(scheduler_id = %id, "not registered with the engine: {e}");
    }
    state.store.delete_scheduler(&id)?;
    info!(scheduler_id = %id, "scheduler deleted");
    Ok(Json(json!({ "status": "deleted", "scheduler_id": id })))
}

/// POST /schedulers/{id}/pause
pub async fn pause_scheduler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    load(&state, &id)?;
    let was_active = state.engine.snapshot(&id).is_some_and(|s| s.is_active);
    if was_active {
        state.engine.pause(&id)?;
    }
    if let Err(e) = state.store.set_active(&id, false) {
        if was_active {
            let _ = state.engine.resume(&id);
        }
        return Err(e.into());
    }
    Ok(Json(json!({ "status": "paused", "scheduler_id": id })))
}

/// POST /schedulers/{id}/resume
///
/// A scheduler that was inactive at startup is not loaded by the engine,
/// so it is registered here instead.
pub async fn resume_scheduler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut record = load(&state, &id)?;
    if state.engine.contains(&id) {
        state.engine.resume(&id)?;
    } else {
        record.is_active = true;
        state.schedule(&record)?;
    }
    if let Err(e) = state.store.set_active(&id, true) {
        let _ = state.engine.pause(&id);
        return Err(e.into());
    }
    Ok(Json(json!({ "status": "resumed", "scheduler_id": id })))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::app::{
        build_router,
        test_support::{test_state, test_state_with},
        AppState,
    };
    use tempo_store::SchedulerStore;
    use std::sync::Arc;

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn app() -> (Arc<AppState>, Router) {
        let state = test_state();
        (state.clone(), build_router(state))
    }

    async fn create_interval(app: &Router) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/schedulers",
            Some(json!({
                "name": "heartbeat",
                "job_type": "custom",
                "frequency": "interval",
                "frequency_config": {"minutes": 5}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (_, app) = app();
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], tempo_core::VERSION);
    }

    #[tokio::test]
    async fn create_registers_and_persists() {
        let (state, app) = app();
        let id = create_interval(&app).await;
        assert!(state.engine.contains(&id));

        let (status, body) = call(&app, Method::GET, &format!("/schedulers/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "heartbeat");
        assert_eq!(body["is_active"], true);
        assert!(body["next_run"].is_string());

        let (_, list) = call(&app, Method::GET, "/schedulers", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_trigger_is_rejected_and_not_stored() {
        let (state, app) = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/schedulers",
            Some(json!({
                "name": "broken",
                "job_type": "email_notification",
                "frequency": "cron",
                "frequency_config": {"cron_expression": "not a cron"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
        assert!(state.engine.is_empty());
        assert!(state.store.list_schedulers().unwrap().is_empty());

        let (status, body) = call(
            &app,
            Method::POST,
            "/schedulers",
            Some(json!({
                "name": "no config",
                "job_type": "custom",
                "frequency": "date",
                "frequency_config": {}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "run_date is required for date frequency");
    }

    #[tokio::test]
    async fn unknown_scheduler_is_404() {
        let (_, app) = app();
        for (method, uri) in [
            (Method::GET, "/schedulers/missing"),
            (Method::DELETE, "/schedulers/missing"),
            (Method::POST, "/schedulers/missing/pause"),
            (Method::POST, "/schedulers/missing/resume"),
        ] {
            let (status, body) = call(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["detail"], "Scheduler not found");
        }
        let (status, _) = call(
            &app,
            Method::PUT,
            "/schedulers/missing",
            Some(json!({"name": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, logs) = call(&app, Method::GET, "/schedulers/missing/logs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs, json!([]));
    }

    #[tokio::test]
    async fn pause_and_resume_round_trip() {
        let (state, app) = app();
        let id = create_interval(&app).await;
        let next_run = state.engine.snapshot(&id).unwrap().next_run;

        let (status, body) = call(&app, Method::POST, &format!("/schedulers/{id}/pause"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "paused", "scheduler_id": id}));
        assert!(!state.engine.snapshot(&id).unwrap().is_active);
        assert!(!state.store.get_scheduler(&id).unwrap().unwrap().is_active);

        let (status, body) = call(&app, Method::POST, &format!("/schedulers/{id}/resume"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "resumed");
        let snap = state.engine.snapshot(&id).unwrap();
        assert!(snap.is_active);
        assert_eq!(snap.next_run, next_run);
    }

    #[tokio::test]
    async fn failed_pause_leaves_the_job_running() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        tempo_store::db::init_db(&conn).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_pause BEFORE UPDATE OF is_active ON schedulers
             WHEN NEW.is_active = 0
             BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
        )
        .unwrap();
        let state = test_state_with(SchedulerStore::new(conn));
        let app = build_router(state.clone());
        let id = create_interval(&app).await;
        let next_run = state.engine.snapshot(&id).unwrap().next_run;

        let (status, body) = call(&app, Method::POST, &format!("/schedulers/{id}/pause"), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("disk I/O error"));

        let snap = state.engine.snapshot(&id).unwrap();
        assert!(snap.is_active);
        assert_eq!(snap.next_run, next_run);
        assert!(state.store.get_scheduler(&id).unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn resume_registers_a_scheduler_the_engine_never_loaded() {
        let (state, app) = app();
        let id = create_interval(&app).await;
        state.store.set_active(&id, false).unwrap();
        state.engine.remove(&id).unwrap();

        let (status, _) = call(&app, Method::POST, &format!("/schedulers/{id}/resume"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.engine.snapshot(&id).unwrap().is_active);
    }

    #[tokio::test]
    async fn update_reschedules_on_trigger_change() {
        let (state, app) = app();
        let id = create_interval(&app).await;

        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/schedulers/{id}"),
            Some(json!({
                "frequency": "cron",
                "frequency_config": {"cron_expression": "0 3 * * *"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["frequency"], "cron");
        assert!(body["updated_at"].is_string());
        let snap = state.engine.snapshot(&id).unwrap();
        assert_eq!(body["next_run"], json!(snap.next_run));

        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("/schedulers/{id}"),
            Some(json!({"frequency_config": {"cron_expression": "bogus"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let stored = state.store.get_scheduler(&id).unwrap().unwrap();
        assert_eq!(stored.frequency_config["cron_expression"], "0 3 * * *");
    }

    #[tokio::test]
    async fn update_is_active_pauses_the_job() {
        let (state, app) = app();
        let id = create_interval(&app).await;
        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/schedulers/{id}"),
            Some(json!({"is_active": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_active"], false);
        assert!(!state.engine.snapshot(&id).unwrap().is_active);
    }

    #[tokio::test]
    async fn delete_unregisters_and_removes() {
        let (state, app) = app();
        let id = create_interval(&app).await;
        let (status, body) = call(&app, Method::DELETE, &format!("/schedulers/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "deleted", "scheduler_id": id}));
        assert!(!state.engine.contains(&id));
        let (status, _) = call(&app, Method::GET, &format!("/schedulers/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn logs_and_stats_reflect_store() {
        let (state, app) = app();
        let id = create_interval(&app).await;
        for _ in 0..3 {
            state
                .store
                .create_log(&id, "custom", tempo_scheduler::ExecutionStatus::Success, None, Some(1))
                .unwrap();
        }

        let (status, logs) = call(&app, Method::GET, &format!("/schedulers/{id}/logs?limit=2"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs.as_array().unwrap().len(), 2);

        let (_, logs) = call(&app, Method::GET, "/logs", None).await;
        assert_eq!(logs.as_array().unwrap().len(), 3);

        let (status, stats) = call(&app, Method::GET, "/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_schedulers"], 1);
        assert_eq!(stats["successful_executions"], 3);
        assert_eq!(stats["executions_by_job_type"]["custom"], 3);
    }
}
