//! `F<slot>.DAT` series file codec.
//!
//! Layout: a 28-byte header whose u16 at offset 2 is the last record index
//! (quote count + 1), then one 28-byte record per quote:
//! date, open, high, low, close, volume and a reserved zero, all legacy floats.

use super::numeric::{decode_legacy_date, encode_legacy_date, MAX_LEGACY_YEAR, MIN_LEGACY_YEAR};
use super::{read_legacy_float_at, read_u16_le, write_legacy_float_at, write_u16_le, CodecError};
use crate::domain::Ohlcv;
use chrono::{Datelike, NaiveDate};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

const STRIDE: usize = 28;
const LAST_RECORD_OFFSET: usize = 2;

const DATE: usize = 0;
const OPEN: usize = 4;
const HIGH: usize = 8;
const LOW: usize = 12;
const CLOSE: usize = 16;
const VOLUME: usize = 20;
const RESERVED: usize = 24;

/// The header index is a u16 and counts one past the last quote.
pub const MAX_SERIES_RECORDS: usize = u16::MAX as usize - 1;

/// One decoded quote record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesRecord {
    pub date: NaiveDate,
    pub values: Ohlcv,
}

/// File name for a slot: `F<slot>.DAT`.
pub fn series_file_name(slot: u16) -> String {
    format!("F{slot}.DAT")
}

/// Read the series file for `slot` from a storage location.
pub fn read_series_file(dir: &Path, slot: u16) -> Result<Vec<SeriesRecord>, CodecError> {
    let path = dir.join(series_file_name(slot));
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CodecError::SeriesFileMissing { path });
        }
        Err(e) => return Err(e.into()),
    };
    decode_series_file(&bytes)
}

/// Decode a series file, trusting its records as written.
pub fn decode_series_file(bytes: &[u8]) -> Result<Vec<SeriesRecord>, CodecError> {
    if bytes.len() < STRIDE {
        return Err(CodecError::TruncatedFile {
            expected: STRIDE,
            actual: bytes.len(),
        });
    }

    let last_record = read_u16_le(bytes, LAST_RECORD_OFFSET) as usize;
    if last_record == 0 {
        return Err(CodecError::MalformedHeader(
            "series file declares a last record index of 0".into(),
        ));
    }
    let count = last_record - 1;

    let expected = STRIDE * (count + 1);
    if bytes.len() < expected {
        return Err(CodecError::TruncatedFile {
            expected,
            actual: bytes.len(),
        });
    }

    let mut records = Vec::with_capacity(count);
    for index in 0..count {
        let base = STRIDE * (index + 1);
        let field = |offset: usize| read_legacy_float_at(bytes, base + offset);

        let date = decode_legacy_date(field(DATE)?)
            .map_err(|source| CodecError::Numeric {
                offset: base + DATE,
                source,
            })?
            .ok_or(CodecError::UnsetQuoteDate { record: index + 1 })?;

        records.push(SeriesRecord {
            date,
            values: Ohlcv {
                open: field(OPEN)?,
                high: field(HIGH)?,
                low: field(LOW)?,
                close: field(CLOSE)?,
                volume: field(VOLUME)?,
            },
        });
    }
    Ok(records)
}

/// Encode records as a series file, in ascending date order whatever the input order.
///
/// A date the packed format cannot hold is an error rather than the zero
/// sentinel, which the decoder refuses for quote records.
pub fn encode_series_file(records: &[SeriesRecord]) -> Result<Vec<u8>, CodecError> {
    if records.len() > MAX_SERIES_RECORDS {
        return Err(CodecError::TooManyRecords {
            count: records.len(),
            max: MAX_SERIES_RECORDS,
        });
    }
    if let Some(bad) = records.iter().find(|r| !is_storable_date(r.date)) {
        return Err(CodecError::QuoteDateOutOfRange {
            date: bad.date,
            min: MIN_LEGACY_YEAR,
            max: MAX_LEGACY_YEAR,
        });
    }

    let mut ordered: Vec<&SeriesRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.date);

    let mut out = vec![0u8; STRIDE * (ordered.len() + 1)];
    write_u16_le(&mut out, LAST_RECORD_OFFSET, (ordered.len() + 1) as u16);

    for (index, record) in ordered.iter().enumerate() {
        let base = STRIDE * (index + 1);
        let v = record.values;
        write_legacy_float_at(&mut out, base + DATE, encode_legacy_date(Some(record.date)))?;
        write_legacy_float_at(&mut out, base + OPEN, v.open)?;
        write_legacy_float_at(&mut out, base + HIGH, v.high)?;
        write_legacy_float_at(&mut out, base + LOW, v.low)?;
        write_legacy_float_at(&mut out, base + CLOSE, v.close)?;
        write_legacy_float_at(&mut out, base + VOLUME, v.volume)?;
        write_legacy_float_at(&mut out, base + RESERVED, 0.0)?;
    }
    Ok(out)
}

/// Whether a quote date survives the packed `YYYMMDD` encoding.
pub fn is_storable_date(date: NaiveDate) -> bool {
    (MIN_LEGACY_YEAR..=MAX_LEGACY_YEAR).contains(&date.year())
}
