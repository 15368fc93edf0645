use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::Job;

/// Source of persisted job definitions, read once at startup.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Every job whose `is_active` flag is set.
    async fn list_active_jobs(&self) -> Result<Vec<Job>, StoreError>;
}

/// Fixed list of jobs. Useful for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticJobStore(pub Vec<Job>);

#[async_trait]
impl JobStore for StaticJobStore {
    async fn list_active_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.0.iter().filter(|j| j.is_active).cloned().collect())
    }
}
