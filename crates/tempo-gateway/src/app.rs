use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tempo_core::config::TempoConfig;
use tempo_scheduler::{JobSnapshot, SchedulerEngine, SchedulerError};
use tempo_store::{SchedulerRecord, SchedulerStore};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::http::{health, logs, schedulers};

/// Shared state handed to every handler as `Arc<AppState>`.
pub struct AppState {
    pub config: TempoConfig,
    pub engine: SchedulerEngine,
    pub store: Arc<SchedulerStore>,
}

impl AppState {
    pub fn new(config: TempoConfig, engine: SchedulerEngine, store: Arc<SchedulerStore>) -> Self {
        Self {
            config,
            engine,
            store,
        }
    }

    /// Replace the persisted run times with the engine's live view.
    pub fn with_live_times(&self, mut record: SchedulerRecord) -> SchedulerRecord {
        if let Some(snap) = self.engine.snapshot(&record.id) {
            record.next_run = snap.next_run;
            if snap.last_run.is_some() {
                record.last_run = snap.last_run;
            }
        }
        record
    }

    /// Register or re-register `record` with the engine.
    ///
    /// Inactive records that were never loaded are registered paused, so
    /// a later resume finds them.
    pub fn schedule(&self, record: &SchedulerRecord) -> Result<JobSnapshot, SchedulerError> {
        if self.engine.contains(&record.id) {
            self.engine.update(record.to_job())
        } else {
            self.engine.add(record.to_job())
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);
    Router::new()
        .route("/", get(health::health_handler))
        .route("/health", get(health::health_handler))
        .route(
            "/schedulers",
            get(schedulers::list_schedulers).post(schedulers::create_scheduler),
        )
        .route(
            "/schedulers/{id}",
            get(schedulers::get_scheduler)
                .put(schedulers::update_scheduler)
                .delete(schedulers::delete_scheduler),
        )
        .route("/schedulers/{id}/pause", post(schedulers::pause_scheduler))
        .route("/schedulers/{id}/resume", post(schedulers::resume_scheduler))
        .route("/schedulers/{id}/logs", get(logs::scheduler_logs))
        .route("/logs", get(logs::all_logs))
        .route("/stats", get(logs::statistics))
        .with_state(state)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempo_scheduler::{
        ExecutionError, FnTask, JobExecutionDispatcher, JobType, MemoryRecorder,
    };

    /// State over an in-memory store and an engine that is never started.
    pub fn test_state() -> Arc<AppState> {
        test_state_with(SchedulerStore::open_in_memory().expect("in-memory store"))
    }

    pub fn test_state_with(store: SchedulerStore) -> Arc<AppState> {
        let config = TempoConfig::default();
        let mut dispatcher = JobExecutionDispatcher::new();
        for job_type in JobType::ALL {
            dispatcher.register(
                job_type,
                Arc::new(FnTask(|_id: String| async { Ok::<(), ExecutionError>(()) })),
            );
        }
        let engine = SchedulerEngine::new(
            dispatcher,
            Arc::new(MemoryRecorder::new()),
            &config.scheduler,
        );
        Arc::new(AppState::new(config, engine, Arc::new(store)))
    }
}
