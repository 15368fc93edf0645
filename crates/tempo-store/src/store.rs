use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tempo_scheduler::{ExecutionStatus, FrequencyConfig, Job, JobStore, StoreError};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{DbError, Result};
use crate::types::{LogRecord, SchedulerRecord, Statistics};

const SCHEDULER_COLUMNS: &str = "id, name, description, job_type, frequency, frequency_config,
     is_active, created_at, updated_at, last_run, next_run";

const LOG_COLUMNS: &str =
    "id, scheduler_id, job_type, status, message, started_at, completed_at, duration";

/// SQLite-backed store for scheduler definitions and execution logs.
///
/// Wraps a single connection in a `Mutex`; every call is one short
/// statement or transaction.
pub struct SchedulerStore {
    db: Mutex<Connection>,
}

impl SchedulerStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_db(&conn)?;
        debug!(path = %path.display(), "database opened");
        Ok(Self::new(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── schedulers ──────────────────────────────────────────────────────────

    #[instrument(skip(self, record), fields(id = %record.id))]
    pub fn insert_scheduler(&self, record: &SchedulerRecord) -> Result<()> {
        let config = serde_json::to_string(&record.frequency_config)?;
        self.lock().execute(
            "INSERT INTO schedulers
             (id, name, description, job_type, frequency, frequency_config,
              is_active, created_at, updated_at, last_run, next_run)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                record.id,
                record.name,
                record.description,
                record.job_type,
                record.frequency,
                config,
                record.is_active,
                ts(&record.created_at),
                record.updated_at.as_ref().map(ts),
                record.last_run.as_ref().map(ts),
                record.next_run.as_ref().map(ts),
            ],
        )?;
        Ok(())
    }

    /// All schedulers, newest first.
    pub fn list_schedulers(&self) -> Result<Vec<SchedulerRecord>> {
        let db = self.lock();
        let mut stmt = db.prepare(&format!(
            "SELECT {SCHEDULER_COLUMNS} FROM schedulers ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], row_to_scheduler)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_scheduler(&self, id: &str) -> Result<Option<SchedulerRecord>> {
        let db = self.lock();
        let record = db
            .query_row(
                &format!("SELECT {SCHEDULER_COLUMNS} FROM schedulers WHERE id = ?1"),
                [id],
                row_to_scheduler,
            )
            .optional()?;
        Ok(record)
    }

    /// Overwrite the editable columns of an existing row and bump `updated_at`.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub fn save_scheduler(&self, record: &SchedulerRecord) -> Result<SchedulerRecord> {
        let config = serde_json::to_string(&record.frequency_config)?;
        let now = Utc::now();
        let changed = self.lock().execute(
            "UPDATE schedulers
             SET name = ?1, description = ?2, job_type = ?3, frequency = ?4,
                 frequency_config = ?5, is_active = ?6, next_run = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                record.name,
                record.description,
                record.job_type,
                record.frequency,
                config,
                record.is_active,
                record.next_run.as_ref().map(ts),
                ts(&now),
                record.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound {
                id: record.id.clone(),
            });
        }
        self.get_scheduler(&record.id)?.ok_or_else(|| DbError::NotFound {
            id: record.id.clone(),
        })
    }

    pub fn set_active(&self, id: &str, active: bool) -> Result<SchedulerRecord> {
        let changed = self.lock().execute(
            "UPDATE schedulers SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, ts(&Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound { id: id.to_string() });
        }
        self.get_scheduler(id)?
            .ok_or_else(|| DbError::NotFound { id: id.to_string() })
    }

    /// Persist the latest run time so restarts can anchor interval triggers.
    pub fn record_run(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.lock().execute(
            "UPDATE schedulers SET last_run = ?1 WHERE id = ?2",
            params![ts(&at), id],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_scheduler(&self, id: &str) -> Result<()> {
        let changed = self
            .lock()
            .execute("DELETE FROM schedulers WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(DbError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    // ── logs ────────────────────────────────────────────────────────────────

    /// Insert a log row. Terminal statuses get `completed_at` immediately.
    pub fn create_log(
        &self,
        scheduler_id: &str,
        job_type: &str,
        status: ExecutionStatus,
        message: Option<&str>,
        duration: Option<u64>,
    ) -> Result<LogRecord> {
        let now = Utc::now();
        let record = LogRecord {
            id: Uuid::new_v4().to_string(),
            scheduler_id: scheduler_id.to_string(),
            job_type: job_type.to_string(),
            status,
            message: message.map(String::from),
            started_at: now,
            completed_at: (status != ExecutionStatus::Running).then_some(now),
            duration,
        };
        self.lock().execute(
            "INSERT INTO logs
             (id, scheduler_id, job_type, status, message, started_at, completed_at, duration)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                record.id,
                record.scheduler_id,
                record.job_type,
                record.status.to_string(),
                record.message,
                ts(&record.started_at),
                record.completed_at.as_ref().map(ts),
                record.duration.map(|d| d as i64),
            ],
        )?;
        Ok(record)
    }

    /// Finalize a log row. A `None` message keeps the previous one.
    pub fn update_log(
        &self,
        id: &str,
        status: ExecutionStatus,
        message: Option<&str>,
        duration: Option<u64>,
    ) -> Result<()> {
        let changed = self.lock().execute(
            "UPDATE logs
             SET status = ?1, message = COALESCE(?2, message),
                 duration = COALESCE(?3, duration), completed_at = ?4
             WHERE id = ?5",
            params![
                status.to_string(),
                message,
                duration.map(|d| d as i64),
                ts(&Utc::now()),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Most recent logs across all schedulers.
    pub fn logs(&self, limit: usize) -> Result<Vec<LogRecord>> {
        let db = self.lock();
        let mut stmt = db.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM logs ORDER BY started_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map([sql_limit(limit)], row_to_log)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn scheduler_logs(&self, scheduler_id: &str, limit: usize) -> Result<Vec<LogRecord>> {
        let db = self.lock();
        let mut stmt = db.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM logs WHERE scheduler_id = ?1
             ORDER BY started_at DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![scheduler_id, sql_limit(limit)], row_to_log)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_log(&self, id: &str) -> Result<Option<LogRecord>> {
        let db = self.lock();
        let record = db
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM logs WHERE id = ?1"),
                [id],
                row_to_log,
            )
            .optional()?;
        Ok(record)
    }

    // ── statistics ──────────────────────────────────────────────────────────

    pub fn statistics(&self) -> Result<Statistics> {
        let db = self.lock();
        let count = |sql: &str| -> rusqlite::Result<u64> {
            db.query_row(sql, [], |r| r.get::<_, i64>(0))
                .map(|n| n as u64)
        };

        let total_schedulers = count("SELECT COUNT(*) FROM schedulers")?;
        let active_schedulers = count("SELECT COUNT(*) FROM schedulers WHERE is_active = 1")?;
        let total_executions = count("SELECT COUNT(*) FROM logs")?;
        let successful_executions = count("SELECT COUNT(*) FROM logs WHERE status = 'success'")?;
        let failed_executions = count("SELECT COUNT(*) FROM logs WHERE status = 'error'")?;

        let average_execution_duration: Option<f64> = db.query_row(
            "SELECT AVG(duration) FROM logs WHERE duration IS NOT NULL",
            [],
            |r| r.get(0),
        )?;

        let grouped = |sql: &str| -> rusqlite::Result<BTreeMap<String, u64>> {
            let mut stmt = db.prepare(sql)?;
            let rows = stmt.query_map([], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
            })?;
            rows.collect()
        };

        Ok(Statistics {
            total_schedulers,
            active_schedulers,
            paused_schedulers: total_schedulers - active_schedulers,
            total_executions,
            successful_executions,
            failed_executions,
            executions_by_job_type: grouped(
                "SELECT job_type, COUNT(*) FROM logs GROUP BY job_type",
            )?,
            executions_by_date: grouped(
                "SELECT substr(started_at, 1, 10), COUNT(*) FROM logs GROUP BY 1",
            )?,
            average_execution_duration,
        })
    }
}

#[async_trait]
impl JobStore for SchedulerStore {
    async fn list_active_jobs(&self) -> std::result::Result<Vec<Job>, StoreError> {
        let records = self
            .list_schedulers()
            .map_err(|e| StoreError(e.to_string()))?;
        Ok(records
            .iter()
            .filter(|r| r.is_active)
            .map(SchedulerRecord::to_job)
            .collect())
    }
}

/// Fixed-precision RFC 3339 so stored timestamps sort lexically.
/// SQLite reads a negative LIMIT as unbounded, so never wrap.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_opt_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_ts(idx, &raw))
        .transpose()
}

fn row_to_scheduler(row: &rusqlite::Row<'_>) -> rusqlite::Result<SchedulerRecord> {
    let config_json: String = row.get(5)?;
    let frequency_config: FrequencyConfig = serde_json::from_str(&config_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at: String = row.get(7)?;

    Ok(SchedulerRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        job_type: row.get(3)?,
        frequency: row.get(4)?,
        frequency_config,
        is_active: row.get(6)?,
        created_at: parse_ts(7, &created_at)?,
        updated_at: parse_opt_ts(row, 8)?,
        last_run: parse_opt_ts(row, 9)?,
        next_run: parse_opt_ts(row, 10)?,
    })
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogRecord> {
    let status: String = row.get(3)?;
    let status: ExecutionStatus = status.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let started_at: String = row.get(5)?;

    Ok(LogRecord {
        id: row.get(0)?,
        scheduler_id: row.get(1)?,
        job_type: row.get(2)?,
        status,
        message: row.get(4)?,
        started_at: parse_ts(5, &started_at)?,
        completed_at: parse_opt_ts(row, 6)?,
        duration: row.get::<_, Option<i64>>(7)?.map(|d| d as u64),
    })
}
