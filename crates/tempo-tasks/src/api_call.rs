use std::time::Duration;

use async_trait::async_trait;
use tempo_scheduler::{ExecutionError, TaskBody};
use tracing::{error, info};

const USER_AGENT: &str = concat!("tempo/", env!("CARGO_PKG_VERSION"));

/// `api_call` body: GET a configured endpoint and fail on a non-2xx status.
#[derive(Debug, Clone)]
pub struct ApiCallTask {
    client: reqwest::Client,
    url: String,
}

impl ApiCallTask {
    pub fn new(url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn call(&self) -> reqwest::Result<serde_json::Value> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl TaskBody for ApiCallTask {
    async fn run(&self, job_id: &str) -> Result<(), ExecutionError> {
        info!(job_id, url = %self.url, "making API call");
        match self.call().await {
            Ok(body) => {
                info!(job_id, response = %body, "API call successful");
                Ok(())
            }
            Err(e) => {
                error!(job_id, url = %self.url, "API call failed: {e}");
                Err(ExecutionError::failed(format!("API call failed: {e}")))
            }
        }
    }
}
