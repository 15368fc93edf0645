//! `tempo-store`: SQLite persistence for scheduler definitions and
//! execution logs.
//!
//! [`SchedulerStore`] implements the engine's [`tempo_scheduler::JobStore`]
//! port and [`SqliteRecorder`] its [`tempo_scheduler::ExecutionRecorder`].

pub mod db;
pub mod error;
pub mod recorder;
pub mod store;
pub mod types;

pub use error::{DbError, Result};
pub use recorder::SqliteRecorder;
pub use store::SchedulerStore;
pub use types::{LogRecord, SchedulerCreate, SchedulerRecord, SchedulerUpdate, Statistics};
