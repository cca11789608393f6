//! Observation feed: `Symbol,Date,Open,High,Low,Close,Volume` with `yyyyMMdd` dates.
//!
//! The same layout is used for export, so an exported set can be fed back in.

use super::{field, parse_price, record_line, FeedError};
use crate::codec::is_storable_date;
use crate::domain::{Observation, Ohlcv};
use chrono::NaiveDate;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

pub const FEED_DATE_FORMAT: &str = "%Y%m%d";
pub const FEED_HEADER: [&str; 7] = ["Symbol", "Date", "Open", "High", "Low", "Close", "Volume"];

/// Parsed observations plus the number of lines that could not be parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedBatch {
    pub observations: Vec<Observation>,
    pub rejected: usize,
}

impl FeedBatch {
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        let mut seen = std::collections::BTreeSet::new();
        self.observations
            .iter()
            .map(|o| o.symbol.as_str())
            .filter(move |s| seen.insert(s.to_ascii_uppercase()))
    }

    pub fn for_symbol<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a Observation> {
        self.observations
            .iter()
            .filter(move |o| o.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Read a feed with a header row. Malformed lines are logged and counted.
pub fn read_feed<R: Read>(reader: R) -> Result<FeedBatch, FeedError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut batch = FeedBatch::default();
    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "unreadable feed line");
                batch.rejected += 1;
                continue;
            }
        };
        match parse_observation(&record) {
            Ok(observation) => batch.observations.push(observation),
            Err(reason) => {
                warn!(line = record_line(&record), %reason, "skipping malformed feed line");
                batch.rejected += 1;
            }
        }
    }
    debug!(
        observations = batch.observations.len(),
        rejected = batch.rejected,
        "feed read"
    );
    Ok(batch)
}

pub fn read_feed_file(path: &Path) -> Result<FeedBatch, FeedError> {
    let file = File::open(path).map_err(|source| FeedError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_feed(file)
}

fn parse_observation(record: &csv::StringRecord) -> Result<Observation, String> {
    let symbol = field(record, 0, "symbol")?;
    if symbol.is_empty() {
        return Err("empty symbol".into());
    }
    let raw_date = field(record, 1, "date")?;
    let date = NaiveDate::parse_from_str(raw_date, FEED_DATE_FORMAT)
        .map_err(|e| format!("invalid date {raw_date:?}: {e}"))?;
    if !is_storable_date(date) {
        return Err(format!("date {raw_date:?} is outside the storable years"));
    }

    Ok(Observation {
        symbol: symbol.to_string(),
        date,
        values: Ohlcv {
            open: parse_price(field(record, 2, "open")?, "open")?,
            high: parse_price(field(record, 3, "high")?, "high")?,
            low: parse_price(field(record, 4, "low")?, "low")?,
            close: parse_price(field(record, 5, "close")?, "close")?,
            volume: parse_price(field(record, 6, "volume")?, "volume")?,
        },
    })
}

/// Write observations in feed layout, header first, in the order given.
pub fn write_feed<'a, W: Write>(
    writer: W,
    observations: impl IntoIterator<Item = &'a Observation>,
) -> Result<usize, csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(FEED_HEADER)?;

    let mut written = 0;
    for o in observations {
        wtr.write_record([
            o.symbol.as_str(),
            &o.date.format(FEED_DATE_FORMAT).to_string(),
            &o.values.open.to_string(),
            &o.values.high.to_string(),
            &o.values.low.to_string(),
            &o.values.close.to_string(),
            &o.values.volume.to_string(),
        ])?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}
