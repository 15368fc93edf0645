use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempo_scheduler::{ExecutionId, ExecutionRecorder, ExecutionStatus, JobType, RecorderError};
use tracing::warn;

use crate::error::DbError;
use crate::store::SchedulerStore;

/// Records executions as rows in the `logs` table.
///
/// `on_start` also stamps the scheduler's `last_run` with the fire time so a
/// restart can anchor interval triggers where they left off.
pub struct SqliteRecorder {
    store: Arc<SchedulerStore>,
}

impl SqliteRecorder {
    pub fn new(store: Arc<SchedulerStore>) -> Self {
        Self { store }
    }
}

impl From<DbError> for RecorderError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { id } => RecorderError::UnknownExecution(id),
            other => RecorderError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
impl ExecutionRecorder for SqliteRecorder {
    async fn on_start(
        &self,
        job_id: &str,
        job_type: JobType,
        fired_at: DateTime<Utc>,
    ) -> Result<ExecutionId, RecorderError> {
        let log = self.store.create_log(
            job_id,
            job_type.as_str(),
            ExecutionStatus::Running,
            Some("Job execution started"),
            None,
        )?;
        if let Err(e) = self.store.record_run(job_id, fired_at) {
            warn!(job_id, "failed to persist last_run: {e}");
        }
        Ok(log.id)
    }

    async fn on_finish(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        message: Option<String>,
        duration: u64,
    ) -> Result<(), RecorderError> {
        self.store
            .update_log(execution_id, status, message.as_deref(), Some(duration))?;
        Ok(())
    }
}
