use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempo_scheduler::{ExecutionStatus, FrequencyConfig, FrequencyType, Job, JobType};

use crate::error::{DbError, Result};

pub const NAME_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

const INTERVAL_KEYS: [&str; 4] = ["seconds", "minutes", "hours", "days"];

/// A persisted scheduler definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub job_type: String,
    pub frequency: String,
    pub frequency_config: FrequencyConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

impl SchedulerRecord {
    /// The engine's view of this record.
    pub fn to_job(&self) -> Job {
        Job {
            id: self.id.clone(),
            name: self.name.clone(),
            job_type: self.job_type.clone(),
            frequency_type: self.frequency.clone(),
            frequency_config: self.frequency_config.clone(),
            is_active: self.is_active,
            last_run: self.last_run,
            next_run: self.next_run,
        }
    }

    /// Whether `other` schedules differently from `self`.
    pub fn trigger_differs(&self, other: &SchedulerRecord) -> bool {
        self.job_type != other.job_type
            || self.frequency != other.frequency
            || self.frequency_config != other.frequency_config
    }
}

/// Body of a create request.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub job_type: JobType,
    pub frequency: FrequencyType,
    pub frequency_config: FrequencyConfig,
}

impl SchedulerCreate {
    /// Field-level checks. Trigger semantics are validated by the engine.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_description(self.description.as_deref())?;
        validate_config_shape(self.frequency, &self.frequency_config)
    }

    pub fn into_record(self, id: String, now: DateTime<Utc>) -> SchedulerRecord {
        SchedulerRecord {
            id,
            name: self.name,
            description: self.description,
            job_type: self.job_type.to_string(),
            frequency: self.frequency.to_string(),
            frequency_config: self.frequency_config,
            is_active: true,
            created_at: now,
            updated_at: None,
            last_run: None,
            next_run: None,
        }
    }
}

/// Body of a partial update request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub job_type: Option<JobType>,
    pub frequency: Option<FrequencyType>,
    pub frequency_config: Option<FrequencyConfig>,
    pub is_active: Option<bool>,
}

impl SchedulerUpdate {
    /// Apply onto a copy of `record`, validating the merged result.
    pub fn apply(&self, record: &SchedulerRecord) -> Result<SchedulerRecord> {
        let mut out = record.clone();
        if let Some(name) = &self.name {
            validate_name(name)?;
            out.name = name.clone();
        }
        if let Some(description) = &self.description {
            validate_description(Some(description))?;
            out.description = Some(description.clone());
        }
        if let Some(job_type) = self.job_type {
            out.job_type = job_type.to_string();
        }
        if let Some(frequency) = self.frequency {
            out.frequency = frequency.to_string();
        }
        if let Some(config) = &self.frequency_config {
            out.frequency_config = config.clone();
        }
        if let Some(active) = self.is_active {
            out.is_active = active;
        }
        if self.frequency.is_some() || self.frequency_config.is_some() {
            let frequency: FrequencyType = out.frequency.parse().map_err(DbError::Validation)?;
            validate_config_shape(frequency, &out.frequency_config)?;
        }
        Ok(out)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > NAME_MAX_CHARS {
        return Err(DbError::Validation(format!(
            "name must be between 1 and {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    if description.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX_CHARS) {
        return Err(DbError::Validation(format!(
            "description must be at most {DESCRIPTION_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

/// Required keys per frequency type.
fn validate_config_shape(frequency: FrequencyType, config: &FrequencyConfig) -> Result<()> {
    let ok = match frequency {
        FrequencyType::Cron => config.contains_key("cron_expression"),
        FrequencyType::Interval => INTERVAL_KEYS.iter().any(|k| config.contains_key(*k)),
        FrequencyType::Date => config.contains_key("run_date"),
    };
    if ok {
        return Ok(());
    }
    let msg = match frequency {
        FrequencyType::Cron => "cron_expression is required for cron frequency",
        FrequencyType::Interval => {
            "At least one interval (seconds, minutes, hours, days) must be specified"
        }
        FrequencyType::Date => "run_date is required for date frequency",
    };
    Err(DbError::Validation(msg.to_string()))
}

/// One execution log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    pub scheduler_id: String,
    pub job_type: String,
    pub status: ExecutionStatus,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<u64>,
}

/// Aggregate counters over schedulers and logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_schedulers: u64,
    pub active_schedulers: u64,
    pub paused_schedulers: u64,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub executions_by_job_type: BTreeMap<String, u64>,
    /// Keyed by `YYYY-MM-DD` of `started_at`.
    pub executions_by_date: BTreeMap<String, u64>,
    pub average_execution_duration: Option<f64>,
}
