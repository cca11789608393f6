//! Report sinks for missing-day, extra-day and validation reports.

use crate::domain::{Ohlcv, ValidationState};
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

use super::feed::FEED_DATE_FORMAT;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One reported day. Missing-day rows carry no values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub values: Option<Ohlcv>,
}

/// A quote whose last validation was not `Ok`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFinding {
    pub symbol: String,
    pub date: NaiveDate,
    pub state: ValidationState,
}

/// Destination for report rows.
pub trait ReportSink {
    fn emit(&mut self, row: &ReportRow) -> Result<(), ReportError>;
}

/// Collects rows in memory.
impl ReportSink for Vec<ReportRow> {
    fn emit(&mut self, row: &ReportRow) -> Result<(), ReportError> {
        self.push(row.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// `Symbol,Date`
    MissingDays,
    /// `Symbol,Date,Open,High,Low,Close,Volume`
    ExtraDays,
}

impl ReportKind {
    fn header(self) -> &'static [&'static str] {
        match self {
            ReportKind::MissingDays => &["Symbol", "Date"],
            ReportKind::ExtraDays => &["Symbol", "Date", "Open", "High", "Low", "Close", "Volume"],
        }
    }
}

/// Writes report rows as CSV with `yyyyMMdd` dates.
pub struct CsvReportSink<W: Write> {
    writer: csv::Writer<W>,
    kind: ReportKind,
    rows: usize,
}

impl<W: Write> CsvReportSink<W> {
    pub fn new(writer: W, kind: ReportKind) -> Result<Self, ReportError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(kind.header())?;
        Ok(Self { writer, kind, rows: 0 })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> Result<W, ReportError> {
        self.writer
            .into_inner()
            .map_err(|e| ReportError::Io(e.into_error()))
    }
}

impl<W: Write> ReportSink for CsvReportSink<W> {
    fn emit(&mut self, row: &ReportRow) -> Result<(), ReportError> {
        let date = row.date.format(FEED_DATE_FORMAT).to_string();
        match (self.kind, row.values) {
            (ReportKind::ExtraDays, Some(v)) => self.writer.write_record([
                row.symbol.as_str(),
                &date,
                &v.open.to_string(),
                &v.high.to_string(),
                &v.low.to_string(),
                &v.close.to_string(),
                &v.volume.to_string(),
            ])?,
            (ReportKind::ExtraDays, None) => {
                self.writer.write_record([row.symbol.as_str(), &date, "", "", "", "", ""])?
            }
            (ReportKind::MissingDays, _) => self.writer.write_record([row.symbol.as_str(), &date])?,
        }
        self.rows += 1;
        Ok(())
    }
}

/// Write findings as `Symbol,Date,Finding`.
pub fn write_findings<'a, W: Write>(
    writer: W,
    findings: impl IntoIterator<Item = &'a ValidationFinding>,
) -> Result<usize, ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Symbol", "Date", "Finding"])?;
    let mut written = 0;
    for f in findings {
        wtr.write_record([
            f.symbol.as_str(),
            &f.date.format(FEED_DATE_FORMAT).to_string(),
            &f.state.to_string(),
        ])?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Option<Ohlcv>) -> ReportRow {
        ReportRow {
            symbol: "BHP".into(),
            date: NaiveDate::from_ymd_opt(2014, 5, 10).unwrap(),
            values,
        }
    }

    #[test]
    fn extra_day_rows_carry_prices() {
        let mut sink = CsvReportSink::new(Vec::new(), ReportKind::ExtraDays).unwrap();
        sink.emit(&row(Some(Ohlcv::new(10.0, 11.0, 9.0, 10.5, 100.0)))).unwrap();
        assert_eq!(sink.rows(), 1);
        let text = String::from_utf8(sink.finish().unwrap()).unwrap();
        assert_eq!(
            text,
            "Symbol,Date,Open,High,Low,Close,Volume\nBHP,20140510,10,11,9,10.5,100\n"
        );
    }

    #[test]
    fn missing_day_rows_are_symbol_and_date() {
        let mut sink = CsvReportSink::new(Vec::new(), ReportKind::MissingDays).unwrap();
        sink.emit(&row(None)).unwrap();
        let text = String::from_utf8(sink.finish().unwrap()).unwrap();
        assert_eq!(text, "Symbol,Date\nBHP,20140510\n");
    }

    #[test]
    fn findings_csv() {
        let findings = vec![ValidationFinding {
            symbol: "BHP".into(),
            date: NaiveDate::from_ymd_opt(2014, 5, 12).unwrap(),
            state: ValidationState::CloseValueOutOfTolerance,
        }];
        let mut buf = Vec::new();
        assert_eq!(write_findings(&mut buf, &findings).unwrap(), 1);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Symbol,Date,Finding\nBHP,20140512,CloseValueOutOfTolerance\n"
        );
    }
}
