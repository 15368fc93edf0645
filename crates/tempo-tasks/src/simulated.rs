use std::time::Duration;

use async_trait::async_trait;
use tempo_scheduler::{ExecutionError, JobType, TaskBody};
use tracing::info;

/// Stand-in for work the service does not perform itself: waits for the
/// job type's nominal duration, then logs completion.
#[derive(Debug, Clone)]
pub struct SimulatedTask {
    job_type: JobType,
    work: Duration,
    done: &'static str,
}

impl SimulatedTask {
    /// `None` for job types that do real work (`api_call`).
    pub fn for_job_type(job_type: JobType, simulate_work: bool) -> Option<Self> {
        let (secs, done) = match job_type {
            JobType::EmailNotification => (2, "email notification sent"),
            JobType::DataBackup => (5, "data backup completed"),
            JobType::ReportGeneration => (10, "report generated"),
            JobType::FileCleanup => (3, "file cleanup completed"),
            JobType::Custom => (1, "custom job executed"),
            JobType::ApiCall => return None,
        };
        let work = if simulate_work {
            Duration::from_secs(secs)
        } else {
            Duration::ZERO
        };
        Some(Self {
            job_type,
            work,
            done,
        })
    }

    pub fn work(&self) -> Duration {
        self.work
    }
}

#[async_trait]
impl TaskBody for SimulatedTask {
    async fn run(&self, job_id: &str) -> Result<(), ExecutionError> {
        info!(job_id, job_type = %self.job_type, "running {}", self.job_type);
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        info!(job_id, job_type = %self.job_type, "{}", self.done);
        Ok(())
    }
}
