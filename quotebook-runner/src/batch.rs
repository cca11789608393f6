//! Batch orchestrator: runs one job over many series sets.
//!
//! A failing set is logged and counted; the remaining sets still run.

use crate::config::ListConfig;
use crate::error::RunError;
use crate::jobs::{Job, JobContext, JobReport};
use serde_json::json;
use tracing::{error, info};

/// Progress callbacks for a batch.
pub trait BatchProgress {
    /// Called before a set is processed.
    fn on_start(&self, list: &str, index: usize, total: usize);

    /// Called after a set is processed.
    fn on_complete(&self, list: &str, index: usize, total: usize, result: &Result<JobReport, RunError>);

    /// Called once every set has been processed.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that writes through `tracing`.
pub struct LogProgress;

impl BatchProgress for LogProgress {
    fn on_start(&self, list: &str, index: usize, total: usize) {
        info!("[{}/{}] processing {list}", index + 1, total);
    }

    fn on_complete(&self, list: &str, index: usize, total: usize, result: &Result<JobReport, RunError>) {
        match result {
            Ok(report) => info!(
                series = report.series,
                rows = report.rows,
                findings = report.findings,
                persisted = report.persisted,
                "[{}/{}] {list} done",
                index + 1,
                total
            ),
            Err(e) => error!(error = %e, "[{}/{}] {list} failed", index + 1, total),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        info!(succeeded, failed, total, "batch complete");
    }
}

/// Progress reporter that does nothing.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn on_start(&self, _list: &str, _index: usize, _total: usize) {}
    fn on_complete(&self, _list: &str, _index: usize, _total: usize, _result: &Result<JobReport, RunError>) {}
    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}

/// Run `job` over every list in order.
pub fn run_batch(
    job: &Job,
    lists: &[ListConfig],
    ctx: &JobContext,
    progress: &dyn BatchProgress,
) -> BatchSummary {
    let total = lists.len();
    let mut summary = BatchSummary {
        job: job.name(),
        total,
        succeeded: 0,
        failed: 0,
        reports: Vec::new(),
        errors: Vec::new(),
    };

    for (i, list) in lists.iter().enumerate() {
        progress.on_start(&list.name, i, total);
        let result = job.run(list, ctx);
        progress.on_complete(&list.name, i, total, &result);

        match result {
            Ok(report) => {
                summary.succeeded += 1;
                summary.reports.push((list.name.clone(), report));
            }
            Err(e) => {
                summary.failed += 1;
                summary.errors.push((list.name.clone(), e));
            }
        }
    }

    progress.on_batch_complete(summary.succeeded, summary.failed, total);
    summary
}

/// Summary of a batch run.
#[derive(Debug)]
pub struct BatchSummary {
    pub job: &'static str,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub reports: Vec<(String, JobReport)>,
    pub errors: Vec<(String, RunError)>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Errors are rendered as their messages.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "job": self.job,
            "total": self.total,
            "succeeded": self.succeeded,
            "failed": self.failed,
            "reports": self
                .reports
                .iter()
                .map(|(list, report)| json!({ "list": list, "report": report }))
                .collect::<Vec<_>>(),
            "errors": self
                .errors
                .iter()
                .map(|(list, e)| json!({ "list": list, "error": e.to_string() }))
                .collect::<Vec<_>>(),
        })
    }
}
