use crate::config::ConfigError;
use quotebook_core::data::{FeedError, ReportError};
use quotebook_core::{ReconciliationError, StoreError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from a job over one series set.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),

    #[error("reconciliation error: {0}")]
    Reconciliation(#[from] ReconciliationError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("list '{0}' has no observation feed")]
    NoFeed(String),
}
