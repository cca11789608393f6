//! Non-trading days file.
//!
//! A CSV with a header row whose dates sit in a configurable column. The two
//! legacy layouts keep them in column 2 and column 3 respectively.

use super::{field, record_line, FeedError};
use crate::domain::NonTradingDays;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Where the dates live in a non-trading days file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayFileFormat {
    /// Zero-based column index.
    pub column: usize,
    /// `chrono` format string.
    pub date_format: String,
}

impl Default for HolidayFileFormat {
    fn default() -> Self {
        Self {
            column: 2,
            date_format: "%Y%m%d".into(),
        }
    }
}

pub fn read_non_trading_days<R: Read>(
    reader: R,
    format: &HolidayFileFormat,
) -> Result<NonTradingDays, FeedError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut days = NonTradingDays::new();
    for result in rdr.records() {
        let record = result?;
        let raw = field(&record, format.column, "date").map_err(|message| FeedError::Parse {
            line: record_line(&record),
            message,
        })?;
        let date = NaiveDate::parse_from_str(raw, &format.date_format).map_err(|e| FeedError::Parse {
            line: record_line(&record),
            message: format!("invalid date {raw:?}: {e}"),
        })?;
        days.insert(date);
    }
    Ok(days)
}

/// Load the file, falling back to an empty calendar (weekends only) on any failure.
pub fn load_non_trading_days(path: &Path, format: &HolidayFileFormat) -> NonTradingDays {
    info!(path = %path.display(), "loading non-trading days");
    let result = File::open(path)
        .map_err(|source| FeedError::Open {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|file| read_non_trading_days(file, format));

    match result {
        Ok(days) => {
            info!(count = days.len(), "non-trading days loaded");
            days
        }
        Err(e) => {
            warn!(error = %e, "cannot read non-trading days file, proceeding without one");
            NonTradingDays::new()
        }
    }
}
