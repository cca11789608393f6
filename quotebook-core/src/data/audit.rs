//! Audit trail export. Written on request, never read back.

use super::feed::FEED_DATE_FORMAT;
use super::report::ReportError;
use crate::domain::QuoteSeries;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Sub-directory of a storage location that holds audit files.
pub const AUDIT_DIR: &str = "Audit";

/// `<symbol>.csv`, with characters unsafe in file names replaced.
pub fn audit_file_name(symbol: &str) -> String {
    let safe: String = symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    format!("{safe}.csv")
}

/// Write every audit entry of the series to `<dir>/<symbol>.csv`.
///
/// Returns `None` when the series has no history to write.
pub fn write_audit_trail(dir: &Path, series: &QuoteSeries) -> Result<Option<PathBuf>, ReportError> {
    if series.quotes().all(|q| q.history().is_empty()) {
        return Ok(None);
    }

    fs::create_dir_all(dir)?;
    let path = dir.join(audit_file_name(series.symbol()));
    let mut wtr = csv::Writer::from_writer(File::create(&path)?);
    wtr.write_record(["Date", "ChangeType", "Open", "High", "Low", "Close", "Volume", "Source"])?;

    for quote in series.quotes() {
        let date = quote.date().format(FEED_DATE_FORMAT).to_string();
        for entry in quote.history() {
            let v = entry.values;
            wtr.write_record([
                date.as_str(),
                &entry.operation.to_string(),
                &v.open.to_string(),
                &v.high.to_string(),
                &v.low.to_string(),
                &v.close.to_string(),
                &v.volume.to_string(),
                &entry.source,
            ])?;
        }
    }
    wtr.flush()?;
    Ok(Some(path))
}
