//! `tempo-tasks`: the built-in task body for every job type.

pub mod api_call;
pub mod simulated;

use std::sync::Arc;
use std::time::Duration;

use tempo_core::config::TasksConfig;
use tempo_scheduler::{JobExecutionDispatcher, JobType};

pub use api_call::ApiCallTask;
pub use simulated::SimulatedTask;

/// A dispatcher with a body registered for all six job types.
pub fn default_dispatcher(config: &TasksConfig) -> reqwest::Result<JobExecutionDispatcher> {
    let api_call = ApiCallTask::new(
        &config.api_call_url,
        Duration::from_secs(config.api_call_timeout_secs),
    )?;

    let mut dispatcher = JobExecutionDispatcher::new().with(JobType::ApiCall, Arc::new(api_call));
    for job_type in JobType::ALL {
        if let Some(task) = SimulatedTask::for_job_type(job_type, config.simulate_work) {
            dispatcher.register(job_type, Arc::new(task));
        }
    }
    Ok(dispatcher)
}
