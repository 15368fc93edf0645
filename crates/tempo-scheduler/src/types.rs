use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key/value trigger configuration, shape depends on the frequency type.
pub type FrequencyConfig = serde_json::Map<String, serde_json::Value>;

/// Identifier of one execution attempt.
pub type ExecutionId = String;

/// Closed set of task bodies a job can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    EmailNotification,
    DataBackup,
    ReportGeneration,
    ApiCall,
    FileCleanup,
    Custom,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::EmailNotification,
        JobType::DataBackup,
        JobType::ReportGeneration,
        JobType::ApiCall,
        JobType::FileCleanup,
        JobType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::EmailNotification => "email_notification",
            JobType::DataBackup => "data_backup",
            JobType::ReportGeneration => "report_generation",
            JobType::ApiCall => "api_call",
            JobType::FileCleanup => "file_cleanup",
            JobType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown job type: {s}"))
    }
}

/// How a job's fire times are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyType {
    Cron,
    Interval,
    Date,
}

impl std::fmt::Display for FrequencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FrequencyType::Cron => "cron",
            FrequencyType::Interval => "interval",
            FrequencyType::Date => "date",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FrequencyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cron" => Ok(FrequencyType::Cron),
            "interval" => Ok(FrequencyType::Interval),
            "date" => Ok(FrequencyType::Date),
            other => Err(format!("unsupported frequency type: {other}")),
        }
    }
}

/// A job as handed to the engine by the API layer or the job store.
///
/// `job_type` and `frequency_type` stay as raw tags here: they are parsed
/// (and rejected with a validation error) when the job is admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Human-readable label, only used in log lines.
    #[serde(default)]
    pub name: String,
    pub job_type: String,
    pub frequency_type: String,
    #[serde(default)]
    pub frequency_config: FrequencyConfig,
    #[serde(default = "bool_true")]
    pub is_active: bool,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
}

fn bool_true() -> bool {
    true
}

impl Job {
    /// Convenience constructor for an active job with no run history.
    pub fn new(
        id: impl Into<String>,
        job_type: JobType,
        frequency_type: FrequencyType,
        frequency_config: FrequencyConfig,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            job_type: job_type.to_string(),
            frequency_type: frequency_type.to_string(),
            frequency_config,
            is_active: true,
            last_run: None,
            next_run: None,
        }
    }
}

/// Where a registered job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Has a pending fire time (active or paused).
    Scheduled,
    /// An execution of this job is in flight.
    Running,
    /// One-shot trigger exhausted; the job never fires again.
    Completed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Scheduled => "scheduled",
            JobState::Running => "running",
            JobState::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub name: String,
    pub job_type: JobType,
    pub frequency_type: FrequencyType,
    pub is_active: bool,
    pub state: JobState,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Status of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "error" => Ok(ExecutionStatus::Error),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// One run attempt of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub job_id: String,
    pub job_type: JobType,
    pub status: ExecutionStatus,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    /// `None` while `status` is `Running`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Whole seconds, set once the execution has completed.
    pub duration: Option<u64>,
}
