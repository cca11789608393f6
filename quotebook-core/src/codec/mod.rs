//! Byte-level codecs for the legacy price container.
//!
//! - [`numeric`]: the 4-byte legacy float and packed dates
//! - [`directory`]: the catalog (`EMASTER` / `MASTER`)
//! - [`series_file`]: one `F<slot>.DAT` file per series

pub mod directory;
pub mod numeric;
pub mod series_file;

pub use directory::{
    decode_catalog, detect_layout, encode_extended_catalog, read_catalog, CatalogEntry,
    CatalogLayout, COMPACT_CATALOG_FILE, EXTENDED_CATALOG_FILE,
};
pub use numeric::{
    decode_legacy_date, decode_legacy_date_bytes, decode_legacy_float, encode_legacy_date,
    encode_legacy_date_bytes, encode_legacy_float, NumericError,
};
pub use series_file::{
    decode_series_file, encode_series_file, is_storable_date, read_series_file, series_file_name,
    SeriesRecord, MAX_SERIES_RECORDS,
};

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding or encoding container files.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("truncated file: expected at least {expected} bytes, found {actual}")]
    TruncatedFile { expected: usize, actual: usize },

    #[error("series file missing: {}", path.display())]
    SeriesFileMissing { path: PathBuf },

    #[error("bad numeric field at byte {offset}: {source}")]
    Numeric {
        offset: usize,
        #[source]
        source: NumericError,
    },

    #[error("{field} exceeds {max} characters: {value:?}")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        value: String,
    },

    #[error("{count} entries exceed the format limit of {max}")]
    TooManyRecords { count: usize, max: usize },

    #[error("quote record {record} carries no date")]
    UnsetQuoteDate { record: usize },

    #[error("quote date {date} is outside the storable years {min}..={max}")]
    QuoteDateOutOfRange { date: NaiveDate, min: i32, max: i32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Fixed-offset field helpers ──────────────────────────────────────

pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn write_u16_le(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_4(buf: &[u8], offset: usize) -> [u8; 4] {
    [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]
}

/// Read a legacy float, tagging any failure with its byte offset.
pub(crate) fn read_legacy_float_at(buf: &[u8], offset: usize) -> Result<f32, CodecError> {
    decode_legacy_float(read_4(buf, offset)).map_err(|source| CodecError::Numeric { offset, source })
}

pub(crate) fn write_legacy_float_at(
    buf: &mut [u8],
    offset: usize,
    value: f32,
) -> Result<(), CodecError> {
    let bytes =
        encode_legacy_float(value).map_err(|source| CodecError::Numeric { offset, source })?;
    buf[offset..offset + 4].copy_from_slice(&bytes);
    Ok(())
}

/// Read a NUL-padded ASCII field: stop at the first NUL, trim whitespace.
pub(crate) fn read_ascii(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).trim().to_string()
}

/// Write a NUL-padded ASCII field. Non-ASCII characters are written as `?`.
pub(crate) fn write_ascii(
    field: &mut [u8],
    name: &'static str,
    value: &str,
) -> Result<(), CodecError> {
    let value = value.trim();
    if value.chars().count() > field.len() {
        return Err(CodecError::FieldTooLong {
            field: name,
            max: field.len(),
            value: value.to_string(),
        });
    }
    field.fill(0);
    for (slot, ch) in field.iter_mut().zip(value.chars()) {
        *slot = if ch.is_ascii() { ch as u8 } else { b'?' };
    }
    Ok(())
}
