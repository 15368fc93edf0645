use thiserror::Error;

use crate::types::JobType;

/// Errors returned synchronously by engine operations.
///
/// Registration errors are raised before the registry is touched, so a
/// failed `add`/`update` never leaves a partial registration behind.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed or incomplete `frequency_config`, or an unsupported job type.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No job with the given ID is registered.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },
}

impl SchedulerError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        SchedulerError::Validation(msg.into())
    }

    pub(crate) fn not_found(id: &str) -> Self {
        SchedulerError::JobNotFound { id: id.to_string() }
    }
}

/// Failure of a task body, caught at the dispatch boundary.
///
/// Never propagates past the engine: it ends up as the `message` of an
/// `error` execution record.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Failed(String),

    #[error("task body panicked: {0}")]
    Panicked(String),

    #[error("no task body registered for job type {0}")]
    NoTaskBody(JobType),
}

impl ExecutionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ExecutionError::Failed(msg.into())
    }
}

/// Failure of the execution recorder itself. Logged, never raised.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recorder backend error: {0}")]
    Backend(String),

    #[error("unknown execution: {0}")]
    UnknownExecution(String),
}

/// Failure of the job store while listing jobs to restore.
#[derive(Debug, Error)]
#[error("job store error: {0}")]
pub struct StoreError(pub String);

pub type Result<T> = std::result::Result<T, SchedulerError>;
