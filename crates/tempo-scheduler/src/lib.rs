//! `tempo-scheduler`: in-process job scheduling and execution engine.
//!
//! # Overview
//!
//! Jobs live in an in-memory [`registry::JobRegistry`]. The
//! [`engine::SchedulerEngine`] keeps a time-ordered queue of fire events,
//! launches due jobs through the [`dispatcher::JobExecutionDispatcher`] and
//! reports every run to an [`recorder::ExecutionRecorder`]. Persistent state
//! is reached only through the [`store::JobStore`] and recorder ports.
//!
//! # Triggers
//!
//! | Frequency  | Config keys                                  | Fires            |
//! |------------|----------------------------------------------|------------------|
//! | `cron`     | `cron_expression`, `timezone`                | every match      |
//! | `interval` | `seconds` / `minutes` / `hours` / `days`     | anchor + k·step  |
//! | `date`     | `run_date`, `timezone`                       | once             |
//!
//! # Overlap
//!
//! A job never runs twice at the same time: a fire event that arrives while
//! the previous run is still in flight is dropped, not queued.

pub mod clock;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod recorder;
pub mod registry;
pub mod store;
pub mod trigger;
pub mod types;

pub use clock::{Clock, SystemClock, TokioClock};
pub use dispatcher::{FnTask, JobExecutionDispatcher, TaskBody};
pub use engine::{RestoreReport, SchedulerEngine};
pub use error::{ExecutionError, RecorderError, Result, SchedulerError, StoreError};
pub use recorder::{ExecutionRecorder, MemoryRecorder};
pub use store::{JobStore, StaticJobStore};
pub use types::{
    Execution, ExecutionId, ExecutionStatus, FrequencyConfig, FrequencyType, Job, JobSnapshot,
    JobState, JobType,
};
