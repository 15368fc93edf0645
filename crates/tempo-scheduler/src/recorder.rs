use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RecorderError;
use crate::types::{Execution, ExecutionId, ExecutionStatus, JobType};

/// Sink for execution lifecycle events.
///
/// Called from execution tasks only, never from the timer loop and never
/// while the registry lock is held. Errors are logged by the engine and
/// otherwise ignored.
#[async_trait]
pub trait ExecutionRecorder: Send + Sync {
    /// Record a new execution in `running` state and return its ID.
    /// `fired_at` is the scheduled fire time, which precedes the start when
    /// the run waited for a concurrency slot.
    async fn on_start(
        &self,
        job_id: &str,
        job_type: JobType,
        fired_at: DateTime<Utc>,
    ) -> Result<ExecutionId, RecorderError>;

    /// Finalize an execution. `duration` is whole seconds.
    async fn on_finish(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        message: Option<String>,
        duration: u64,
    ) -> Result<(), RecorderError>;
}

/// In-process recorder. Keeps every execution in insertion order.
#[derive(Default)]
pub struct MemoryRecorder {
    inner: Mutex<MemoryLog>,
}

#[derive(Default)]
struct MemoryLog {
    order: Vec<ExecutionId>,
    by_id: HashMap<ExecutionId, Execution>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All executions recorded so far, oldest first.
    pub fn executions(&self) -> Vec<Execution> {
        let log = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        log.order
            .iter()
            .filter_map(|id| log.by_id.get(id).cloned())
            .collect()
    }

    pub fn executions_for(&self, job_id: &str) -> Vec<Execution> {
        self.executions()
            .into_iter()
            .filter(|e| e.job_id == job_id)
            .collect()
    }
}

#[async_trait]
impl ExecutionRecorder for MemoryRecorder {
    async fn on_start(
        &self,
        job_id: &str,
        job_type: JobType,
        _fired_at: DateTime<Utc>,
    ) -> Result<ExecutionId, RecorderError> {
        let id = Uuid::new_v4().to_string();
        let execution = Execution {
            id: id.clone(),
            job_id: job_id.to_string(),
            job_type,
            status: ExecutionStatus::Running,
            message: None,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
        };
        let mut log = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        log.order.push(id.clone());
        log.by_id.insert(id.clone(), execution);
        Ok(id)
    }

    async fn on_finish(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        message: Option<String>,
        duration: u64,
    ) -> Result<(), RecorderError> {
        let mut log = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let execution = log
            .by_id
            .get_mut(execution_id)
            .ok_or_else(|| RecorderError::UnknownExecution(execution_id.to_string()))?;
        execution.status = status;
        execution.message = message;
        execution.completed_at = Some(Utc::now());
        execution.duration = Some(duration);
        Ok(())
    }
}
