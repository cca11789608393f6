//! Corrections file: `Symbol,Date,Type,Open,High,Low,Close,Vol`.
//!
//! Loading is all-or-nothing; one bad line fails the whole file.

use super::{field, parse_price, record_line, FeedError};
use crate::domain::{Correction, CorrectionKind, Ohlcv};
use chrono::NaiveDate;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

pub const DEFAULT_CORRECTIONS_DATE_FORMAT: &str = "%Y%m%d";

pub fn read_corrections<R: Read>(reader: R, date_format: &str) -> Result<Vec<Correction>, FeedError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut corrections = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let correction = parse_correction(&record, date_format).map_err(|message| FeedError::Parse {
            line: record_line(&record),
            message,
        })?;
        corrections.push(correction);
    }
    Ok(corrections)
}

pub fn read_corrections_file(path: &Path, date_format: &str) -> Result<Vec<Correction>, FeedError> {
    info!(path = %path.display(), "loading corrections");
    let file = File::open(path).map_err(|source| FeedError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_corrections(file, date_format)
}

fn parse_correction(record: &csv::StringRecord, date_format: &str) -> Result<Correction, String> {
    let symbol = field(record, 0, "symbol")?;
    if symbol.is_empty() {
        return Err("empty symbol".into());
    }
    let raw_date = field(record, 1, "date")?;
    let date = NaiveDate::parse_from_str(raw_date, date_format)
        .map_err(|e| format!("invalid date {raw_date:?}: {e}"))?;
    let kind: CorrectionKind = field(record, 2, "type")?.parse()?;

    // RemoveDate lines usually leave the prices blank
    let price = |index: usize, name: &str| -> Result<f32, String> {
        match record.get(index).map(str::trim) {
            None | Some("") if kind == CorrectionKind::RemoveDate => Ok(0.0),
            Some(raw) => parse_price(raw, name),
            None => Err(format!("missing {name} column")),
        }
    };

    Ok(Correction {
        symbol: symbol.to_string(),
        date,
        kind,
        values: Ohlcv {
            open: price(3, "open")?,
            high: price(4, "high")?,
            low: price(5, "low")?,
            close: price(6, "close")?,
            volume: price(7, "volume")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Symbol,Date,Type,Open,High,Low,Close,Vol\n";

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn reads_all_kinds() {
        let csv = format!(
            "{HEADER}BHP,20140509,AddDate,10,11,9,10.5,100\n\
             BHP,20140512,RemoveDate,,,,,\n\
             CBA,20140513,CorrectPrices,80,81,79,80.5,2000\n"
        );
        let corrections = read_corrections(csv.as_bytes(), DEFAULT_CORRECTIONS_DATE_FORMAT).unwrap();
        assert_eq!(corrections.len(), 3);
        assert_eq!(corrections[0].kind, CorrectionKind::AddDate);
        assert_eq!(corrections[0].values.close, 10.5);
        assert_eq!(corrections[1].kind, CorrectionKind::RemoveDate);
        assert_eq!(corrections[1].values, Ohlcv::default());
        assert_eq!(corrections[2].date, ymd(2014, 5, 13));
    }

    #[test]
    fn date_format_is_configurable() {
        let csv = format!("{HEADER}BHP,09/05/2014,AddDate,10,11,9,10.5,100\n");
        let corrections = read_corrections(csv.as_bytes(), "%d/%m/%Y").unwrap();
        assert_eq!(corrections[0].date, ymd(2014, 5, 9));
    }

    #[test]
    fn one_bad_line_fails_the_load() {
        let csv = format!(
            "{HEADER}BHP,20140509,AddDate,10,11,9,10.5,100\n\
             BHP,20140512,Delete,10,11,9,10.5,100\n"
        );
        let err = read_corrections(csv.as_bytes(), DEFAULT_CORRECTIONS_DATE_FORMAT).unwrap_err();
        match err {
            FeedError::Parse { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("unknown correction type"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn price_corrections_need_prices() {
        let csv = format!("{HEADER}BHP,20140509,CorrectPrices,10,,9,10.5,100\n");
        assert!(read_corrections(csv.as_bytes(), DEFAULT_CORRECTIONS_DATE_FORMAT).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_corrections_file(&dir.path().join("none.csv"), DEFAULT_CORRECTIONS_DATE_FORMAT).unwrap_err();
        assert!(matches!(err, FeedError::Open { .. }));
    }
}
