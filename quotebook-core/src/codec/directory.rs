//! Catalog codec.
//!
//! Two on-disk layouts describe the same content:
//!
//! - `EMASTER` (extended): 192-byte header and records, dates as IEEE singles
//! - `MASTER` (compact): 53-byte header and records, dates as legacy floats
//!
//! Both are read; only the extended layout is ever written.
//!
//! The autorun byte is carried through verbatim on rewrite. Series created
//! in memory get `*`, the compact writer's value, rather than the `#` that
//! extended writers traditionally put at record offset 9; readers of either
//! layout accept both.

use super::numeric::{decode_legacy_date, decode_legacy_float, encode_legacy_date};
use super::{read_4, read_ascii, read_u16_le, write_ascii, write_u16_le};
use super::CodecError;
use crate::domain::TimeFrame;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const EXTENDED_CATALOG_FILE: &str = "EMASTER";
pub const COMPACT_CATALOG_FILE: &str = "MASTER";

/// The slot is a single byte on disk.
pub const MAX_CATALOG_ENTRIES: usize = u8::MAX as usize;

const EXTENDED_STRIDE: usize = 192;
const COMPACT_STRIDE: usize = 53;

/// Number of 4-byte fields per quote record (date, OHLCV, reserved).
const FIELD_COUNT: u8 = 7;
/// Autorun flag written for series that never had one on disk (`*`, not `#`).
pub const DEFAULT_AUTORUN_FLAG: u8 = b'*';

const SYMBOL_WIDTH: usize = 14;
const NAME_WIDTH: usize = 16;

// Extended record offsets
const EXT_MARKER: usize = 0;
const EXT_SLOT: usize = 2;
const EXT_FIELDS: usize = 6;
const EXT_FLAG: usize = 9;
const EXT_SYMBOL: usize = 11;
const EXT_NAME: usize = 32;
const EXT_TIME_FRAME: usize = 60;
const EXT_FIRST_DATE: usize = 64;
const EXT_LAST_DATE: usize = 72;

// Compact record offsets
const CMP_SLOT: usize = 0;
const CMP_NAME: usize = 7;
const CMP_FIRST_DATE: usize = 25;
const CMP_LAST_DATE: usize = 29;
const CMP_TIME_FRAME: usize = 33;
const CMP_SYMBOL: usize = 36;
const CMP_FLAG: usize = 51;

/// Which catalog file a storage location carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogLayout {
    /// `MASTER`, the older 53-byte layout.
    Compact,
    /// `EMASTER`, the 192-byte layout.
    Extended,
}

impl CatalogLayout {
    /// Header size and record stride, which are equal in both layouts.
    pub fn stride(self) -> usize {
        match self {
            CatalogLayout::Compact => COMPACT_STRIDE,
            CatalogLayout::Extended => EXTENDED_STRIDE,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            CatalogLayout::Compact => COMPACT_CATALOG_FILE,
            CatalogLayout::Extended => EXTENDED_CATALOG_FILE,
        }
    }
}

/// One catalog record: a series skeleton without its quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub slot: u16,
    pub symbol: String,
    pub display_name: String,
    pub time_frame: TimeFrame,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub autorun_flag: u8,
}

/// Find the catalog in a storage location, preferring the extended layout.
pub fn detect_layout(dir: &Path) -> Option<CatalogLayout> {
    [CatalogLayout::Extended, CatalogLayout::Compact]
        .into_iter()
        .find(|layout| dir.join(layout.file_name()).is_file())
}

/// Read whichever catalog the directory holds. `Ok(None)` means no catalog exists.
pub fn read_catalog(dir: &Path) -> Result<Option<(CatalogLayout, Vec<CatalogEntry>)>, CodecError> {
    let Some(layout) = detect_layout(dir) else {
        return Ok(None);
    };
    let path = dir.join(layout.file_name());
    debug!(path = %path.display(), ?layout, "reading catalog");
    let bytes = fs::read(&path)?;
    let entries = decode_catalog(&bytes, layout)?;
    Ok(Some((layout, entries)))
}

/// Decode catalog bytes in the given layout.
///
/// Records are read up to the declared series count. A slot that does not
/// match its position is logged and kept; a zero slot has no series file and
/// the record is dropped.
pub fn decode_catalog(bytes: &[u8], layout: CatalogLayout) -> Result<Vec<CatalogEntry>, CodecError> {
    let stride = layout.stride();
    if bytes.len() < stride {
        return Err(CodecError::TruncatedFile {
            expected: stride,
            actual: bytes.len(),
        });
    }

    let count = read_u16_le(bytes, 0) as usize;
    let highest_slot = read_u16_le(bytes, 2) as usize;
    if highest_slot < count {
        return Err(CodecError::MalformedHeader(format!(
            "{} declares {count} series but a highest slot of {highest_slot}",
            layout.file_name()
        )));
    }

    let expected = stride * (count + 1);
    if bytes.len() < expected {
        return Err(CodecError::TruncatedFile {
            expected,
            actual: bytes.len(),
        });
    }

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let base = stride * (index + 1);
        let record = &bytes[base..base + stride];
        let entry = match layout {
            CatalogLayout::Extended => decode_extended_record(record, base)?,
            CatalogLayout::Compact => decode_compact_record(record, base)?,
        };

        if entry.slot == 0 {
            warn!(record = index + 1, symbol = %entry.symbol, "catalog record has no slot, skipping");
            continue;
        }
        if entry.slot as usize != index + 1 {
            warn!(
                expected = index + 1,
                found = entry.slot,
                symbol = %entry.symbol,
                "catalog slot out of sequence"
            );
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn decode_extended_record(record: &[u8], base: usize) -> Result<CatalogEntry, CodecError> {
    Ok(CatalogEntry {
        slot: record[EXT_SLOT] as u16,
        symbol: read_ascii(&record[EXT_SYMBOL..EXT_SYMBOL + SYMBOL_WIDTH]),
        display_name: read_ascii(&record[EXT_NAME..EXT_NAME + NAME_WIDTH]),
        time_frame: TimeFrame::from_marker(record[EXT_TIME_FRAME]),
        first_date: read_ieee_date(record, base, EXT_FIRST_DATE)?,
        last_date: read_ieee_date(record, base, EXT_LAST_DATE)?,
        autorun_flag: record[EXT_FLAG],
    })
}

fn decode_compact_record(record: &[u8], base: usize) -> Result<CatalogEntry, CodecError> {
    Ok(CatalogEntry {
        slot: record[CMP_SLOT] as u16,
        symbol: read_ascii(&record[CMP_SYMBOL..CMP_SYMBOL + SYMBOL_WIDTH]),
        display_name: read_ascii(&record[CMP_NAME..CMP_NAME + NAME_WIDTH]),
        time_frame: TimeFrame::from_marker(record[CMP_TIME_FRAME]),
        first_date: read_legacy_date(record, base, CMP_FIRST_DATE)?,
        last_date: read_legacy_date(record, base, CMP_LAST_DATE)?,
        autorun_flag: record[CMP_FLAG],
    })
}

/// Extended catalogs keep `YYYMMDD` as a plain little-endian IEEE single.
fn read_ieee_date(record: &[u8], base: usize, offset: usize) -> Result<Option<NaiveDate>, CodecError> {
    let value = f32::from_le_bytes(read_4(record, offset));
    decode_legacy_date(value).map_err(|source| CodecError::Numeric {
        offset: base + offset,
        source,
    })
}

fn read_legacy_date(record: &[u8], base: usize, offset: usize) -> Result<Option<NaiveDate>, CodecError> {
    decode_legacy_float(read_4(record, offset))
        .and_then(decode_legacy_date)
        .map_err(|source| CodecError::Numeric {
            offset: base + offset,
            source,
        })
}

/// Encode entries as an extended catalog.
///
/// Slots are assigned 1..N in list order; the `slot` carried by each entry
/// is ignored.
pub fn encode_extended_catalog(entries: &[CatalogEntry]) -> Result<Vec<u8>, CodecError> {
    if entries.len() > MAX_CATALOG_ENTRIES {
        return Err(CodecError::TooManyRecords {
            count: entries.len(),
            max: MAX_CATALOG_ENTRIES,
        });
    }

    let mut out = vec![0u8; EXTENDED_STRIDE * (entries.len() + 1)];
    let count = entries.len() as u16;
    write_u16_le(&mut out, 0, count);
    write_u16_le(&mut out, 2, count);

    for (index, entry) in entries.iter().enumerate() {
        let base = EXTENDED_STRIDE * (index + 1);
        let record = &mut out[base..base + EXTENDED_STRIDE];

        record[EXT_MARKER..EXT_MARKER + 2].copy_from_slice(b"66");
        record[EXT_SLOT] = (index + 1) as u8;
        record[EXT_FIELDS] = FIELD_COUNT;
        record[EXT_FLAG] = entry.autorun_flag;
        write_ascii(&mut record[EXT_SYMBOL..EXT_SYMBOL + SYMBOL_WIDTH], "symbol", &entry.symbol)?;
        write_ascii(&mut record[EXT_NAME..EXT_NAME + NAME_WIDTH], "display name", &entry.display_name)?;
        record[EXT_TIME_FRAME] = entry.time_frame.marker();
        record[EXT_FIRST_DATE..EXT_FIRST_DATE + 4]
            .copy_from_slice(&encode_legacy_date(entry.first_date).to_le_bytes());
        record[EXT_LAST_DATE..EXT_LAST_DATE + 4]
            .copy_from_slice(&encode_legacy_date(entry.last_date).to_le_bytes());
    }
    Ok(out)
}
