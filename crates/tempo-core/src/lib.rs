//! `tempo-core`: configuration and error types shared by every tempo crate.

pub mod config;
pub mod error;

pub use config::TempoConfig;
pub use error::{Result, TempoError};

/// Crate version reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
