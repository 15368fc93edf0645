use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::ExecutionError;
use crate::types::JobType;

/// The unit of work behind one job type.
///
/// Implementations may block on I/O for as long as they need; the engine
/// applies no timeout. Retries, if wanted, belong inside the body.
#[async_trait]
pub trait TaskBody: Send + Sync {
    async fn run(&self, job_id: &str) -> Result<(), ExecutionError>;
}

/// Maps every supported [`JobType`] to its task body.
#[derive(Clone, Default)]
pub struct JobExecutionDispatcher {
    bodies: HashMap<JobType, Arc<dyn TaskBody>>,
}

impl JobExecutionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body for `job_type`, replacing any previous one.
    pub fn register(&mut self, job_type: JobType, body: Arc<dyn TaskBody>) {
        info!(%job_type, "registering task body");
        self.bodies.insert(job_type, body);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, job_type: JobType, body: Arc<dyn TaskBody>) -> Self {
        self.register(job_type, body);
        self
    }

    pub fn supports(&self, job_type: JobType) -> bool {
        self.bodies.contains_key(&job_type)
    }

    /// Run the body for `job_type`.
    ///
    /// The body runs in its own task so a panic surfaces as
    /// [`ExecutionError::Panicked`] instead of unwinding into the engine.
    pub async fn execute(&self, job_type: JobType, job_id: &str) -> Result<(), ExecutionError> {
        let body = self
            .bodies
            .get(&job_type)
            .cloned()
            .ok_or(ExecutionError::NoTaskBody(job_type))?;

        debug!(job_id, %job_type, "dispatching task body");
        let id = job_id.to_string();
        match tokio::spawn(async move { body.run(&id).await }).await {
            Ok(outcome) => outcome,
            Err(join) if join.is_panic() => {
                let payload = join.into_panic();
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ExecutionError::Panicked(msg))
            }
            Err(join) => Err(ExecutionError::failed(format!("task body aborted: {join}"))),
        }
    }
}

/// Task body backed by an async closure. Handy for embedding and tests.
pub struct FnTask<F>(pub F);

#[async_trait]
impl<F, Fut> TaskBody for FnTask<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), ExecutionError>> + Send,
{
    async fn run(&self, job_id: &str) -> Result<(), ExecutionError> {
        (self.0)(job_id.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_body() -> Arc<dyn TaskBody> {
        Arc::new(FnTask(|_id: String| async { Ok::<(), ExecutionError>(()) }))
    }

    #[tokio::test]
    async fn dispatches_to_registered_body() {
        let d = JobExecutionDispatcher::new().with(JobType::Custom, ok_body());
        assert!(d.supports(JobType::Custom));
        assert!(!d.supports(JobType::ApiCall));
        assert!(d.execute(JobType::Custom, "j1").await.is_ok());
    }

    #[tokio::test]
    async fn missing_body_is_an_execution_error() {
        let d = JobExecutionDispatcher::new();
        assert!(matches!(
            d.execute(JobType::DataBackup, "j1").await,
            Err(ExecutionError::NoTaskBody(JobType::DataBackup))
        ));
    }

    #[tokio::test]
    async fn body_failure_is_returned() {
        let d = JobExecutionDispatcher::new().with(
            JobType::ApiCall,
            Arc::new(FnTask(|id: String| async move {
                Err::<(), _>(ExecutionError::failed(format!("endpoint down for {id}")))
            })),
        );
        let err = d.execute(JobType::ApiCall, "j9").await.unwrap_err();
        assert_eq!(err.to_string(), "endpoint down for j9");
    }

    #[tokio::test]
    async fn panicking_body_is_caught() {
        let d = JobExecutionDispatcher::new().with(
            JobType::Custom,
            Arc::new(FnTask(|_id: String| async move {
                if true {
                    panic!("boom");
                }
                Ok::<(), ExecutionError>(())
            })),
        );
        match d.execute(JobType::Custom, "j1").await {
            Err(ExecutionError::Panicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected panic error, got {other:?}"),
        }
    }
}
