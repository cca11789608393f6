//! Quotebook Runner: batch jobs over series sets.
//!
//! This crate builds on `quotebook-core` to provide:
//! - TOML configuration of the list master (defaults plus one entry per set)
//! - One job per operating mode: clean, extra-day, added-days, missing-days,
//!   export, import, period, check, update
//! - Batch orchestration with per-set failure isolation and progress callbacks

pub mod batch;
pub mod config;
pub mod error;
pub mod jobs;

pub use batch::{run_batch, BatchProgress, BatchSummary, LogProgress, SilentProgress};
pub use config::{ConfigError, Defaults, ListConfig, RunnerConfig};
pub use error::RunError;
pub use jobs::{report_file_name, Job, JobContext, JobReport};
