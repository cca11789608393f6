//! Legacy 4-byte float and packed-date conversions.
//!
//! The container predates IEEE-754 and stores every number in a Microsoft
//! Binary Format style single:
//!
//! ```text
//! byte:   0          1          2               3
//!        [mant 0-7] [mant 8-15] [S|mant 16-22]  [exponent]
//! ```
//!
//! The exponent is biased two higher than IEEE's, the sign sits in bit 7 of
//! byte 2, and the 23 mantissa bits carry over unchanged. Dates ride on top of
//! the float format as the decimal value `YYYMMDD` (years counted from 1900).

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Offset between the legacy exponent byte and the IEEE-754 exponent field.
const EXPONENT_BIAS_DELTA: u32 = 2;

/// Largest IEEE exponent field that still fits in the legacy exponent byte.
const MAX_IEEE_EXPONENT: u32 = 0xFF - EXPONENT_BIAS_DELTA;

/// Earliest year the packed date representation can hold.
pub const MIN_LEGACY_YEAR: i32 = 1900;

/// Latest year the packed date representation can hold (three-digit year offset).
pub const MAX_LEGACY_YEAR: i32 = 2899;

/// Value stored for an unset date.
pub const UNSET_DATE_VALUE: f32 = 0.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericError {
    #[error("value {0} is not finite and has no legacy representation")]
    NotFinite(f32),

    #[error("legacy float {0:02X?} underflows single precision")]
    Underflow([u8; 4]),

    #[error("value {0} exceeds the legacy float range")]
    Overflow(f32),

    #[error("legacy date value {0} does not encode a calendar date")]
    InvalidDate(f32),
}

/// Decode a legacy float into an IEEE-754 single.
pub fn decode_legacy_float(bytes: [u8; 4]) -> Result<f32, NumericError> {
    let exponent = bytes[3] as u32;
    if exponent == 0 {
        return Ok(0.0);
    }
    if exponent <= EXPONENT_BIAS_DELTA {
        // Exponent 1 and 2 have no IEEE counterpart; only an all-zero mantissa
        // is accepted there, as some writers emit `00 00 00 02` for zero.
        if bytes[0] == 0 && bytes[1] == 0 && bytes[2] == 0 {
            return Ok(0.0);
        }
        return Err(NumericError::Underflow(bytes));
    }

    let sign = ((bytes[2] & 0x80) as u32) << 24;
    let mantissa = (((bytes[2] & 0x7F) as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[0] as u32;
    let ieee_exponent = (exponent - EXPONENT_BIAS_DELTA) << 23;

    Ok(f32::from_bits(sign | ieee_exponent | mantissa))
}

/// Encode an IEEE-754 single as a legacy float.
///
/// Zero (of either sign) and subnormals encode as four zero bytes.
pub fn encode_legacy_float(value: f32) -> Result<[u8; 4], NumericError> {
    if !value.is_finite() {
        return Err(NumericError::NotFinite(value));
    }

    let bits = value.to_bits();
    let ieee_exponent = (bits >> 23) & 0xFF;
    if ieee_exponent == 0 {
        return Ok([0; 4]);
    }
    if ieee_exponent > MAX_IEEE_EXPONENT {
        return Err(NumericError::Overflow(value));
    }

    let sign = ((bits >> 31) as u8) << 7;
    let mantissa = bits & 0x007F_FFFF;

    Ok([
        (mantissa & 0xFF) as u8,
        ((mantissa >> 8) & 0xFF) as u8,
        ((mantissa >> 16) as u8) | sign,
        (ieee_exponent + EXPONENT_BIAS_DELTA) as u8,
    ])
}

/// Decode a packed `YYYMMDD` float into a date. `0.0` is the unset sentinel.
///
/// The value is read as a decimal integer: the last two digits are the day,
/// the two before them the month, and whatever remains is the year minus 1900.
pub fn decode_legacy_date(value: f32) -> Result<Option<NaiveDate>, NumericError> {
    if value == UNSET_DATE_VALUE {
        return Ok(None);
    }
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(NumericError::InvalidDate(value));
    }

    let packed = value as u32;
    let day = packed % 100;
    let month = (packed / 100) % 100;
    let year = (packed / 10_000) as i32 + MIN_LEGACY_YEAR;

    NaiveDate::from_ymd_opt(year, month, day)
        .map(Some)
        .ok_or(NumericError::InvalidDate(value))
}

/// Encode a date as a packed `YYYMMDD` float.
///
/// Unset dates and dates outside [1900, 2899] encode as the zero sentinel so
/// that placeholder bounds survive a rewrite instead of failing it.
pub fn encode_legacy_date(date: Option<NaiveDate>) -> f32 {
    match date {
        Some(d) if (MIN_LEGACY_YEAR..=MAX_LEGACY_YEAR).contains(&d.year()) => {
            let packed = (d.year() - MIN_LEGACY_YEAR) as u32 * 10_000 + d.month() * 100 + d.day();
            packed as f32
        }
        _ => UNSET_DATE_VALUE,
    }
}

/// Encode a date straight to legacy float bytes.
pub fn encode_legacy_date_bytes(date: Option<NaiveDate>) -> Result<[u8; 4], NumericError> {
    encode_legacy_float(encode_legacy_date(date))
}

/// Decode legacy float bytes straight to a date.
pub fn decode_legacy_date_bytes(bytes: [u8; 4]) -> Result<Option<NaiveDate>, NumericError> {
    decode_legacy_date(decode_legacy_float(bytes)?)
}
