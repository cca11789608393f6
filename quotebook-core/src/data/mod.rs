//! Flat-file adapters around the container: observation feeds, corrections,
//! non-trading days, reports and the audit trail. All CSV.

pub mod audit;
pub mod corrections;
pub mod feed;
pub mod holidays;
pub mod report;

pub use audit::{audit_file_name, write_audit_trail, AUDIT_DIR};
pub use corrections::{read_corrections, read_corrections_file, DEFAULT_CORRECTIONS_DATE_FORMAT};
pub use feed::{read_feed, read_feed_file, write_feed, FeedBatch, FEED_DATE_FORMAT};
pub use holidays::{load_non_trading_days, read_non_trading_days, HolidayFileFormat};
pub use report::{
    write_findings, CsvReportSink, ReportError, ReportKind, ReportRow, ReportSink, ValidationFinding,
};

use std::path::PathBuf;
use thiserror::Error;

/// Errors reading an inbound flat file.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: {message}")]
    Parse { line: u64, message: String },
}

// ── Field parsing helpers ───────────────────────────────────────────

pub(crate) fn field<'r>(record: &'r csv::StringRecord, index: usize, name: &str) -> Result<&'r str, String> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| format!("missing {name} column"))
}

pub(crate) fn parse_price(raw: &str, name: &str) -> Result<f32, String> {
    let value: f32 = raw.parse().map_err(|_| format!("invalid {name}: {raw:?}"))?;
    if !value.is_finite() {
        return Err(format!("invalid {name}: {raw:?}"));
    }
    Ok(value)
}

pub(crate) fn record_line(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}
