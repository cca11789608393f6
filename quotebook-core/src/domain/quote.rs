//! Quote: one trading day of one series, with its validation state and audit trail.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Open/high/low/close/volume as stored in the container (single precision).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: f32,
}

impl Ohlcv {
    pub fn new(open: f32, high: f32, low: f32, close: f32, volume: f32) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// All four prices equal, as used for flat synthetic days.
    pub fn flat(price: f32, volume: f32) -> Self {
        Self::new(price, price, price, price, volume)
    }
}

/// Result of the last validation pass over a quote. Never fatal; reported only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValidationState {
    #[default]
    Ok,
    NonTradingDay,
    HighIsNotHighest,
    LowIsNotLowest,
    OpenValueOutOfTolerance,
    CloseValueOutOfTolerance,
    HighValueOutOfTolerance,
    LowValueOutOfTolerance,
}

impl ValidationState {
    pub fn is_ok(self) -> bool {
        self == ValidationState::Ok
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationState::Ok => "Ok",
            ValidationState::NonTradingDay => "NonTradingDay",
            ValidationState::HighIsNotHighest => "HighIsNotHighest",
            ValidationState::LowIsNotLowest => "LowIsNotLowest",
            ValidationState::OpenValueOutOfTolerance => "OpenValueOutOfTolerance",
            ValidationState::CloseValueOutOfTolerance => "CloseValueOutOfTolerance",
            ValidationState::HighValueOutOfTolerance => "HighValueOutOfTolerance",
            ValidationState::LowValueOutOfTolerance => "LowValueOutOfTolerance",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOperation {
    Add,
    Update,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Add => f.write_str("Add"),
            ChangeOperation::Update => f.write_str("Update"),
        }
    }
}

/// One mutation of a quote. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub operation: ChangeOperation,
    pub values: Ohlcv,
    pub source: String,
}

/// A single day of prices for one series.
///
/// Values change only through [`Quote::update`], which records an audit entry.
/// Quotes read back from disk start with an empty history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    date: NaiveDate,
    values: Ohlcv,
    validation: ValidationState,
    history: Vec<AuditEntry>,
}

impl Quote {
    /// A freshly observed quote, recorded as an `Add`.
    pub fn new(date: NaiveDate, values: Ohlcv, source: impl Into<String>) -> Self {
        Self {
            date,
            values,
            validation: ValidationState::Ok,
            history: vec![AuditEntry {
                operation: ChangeOperation::Add,
                values,
                source: source.into(),
            }],
        }
    }

    /// A quote loaded from a series file: trusted, no history.
    pub fn stored(date: NaiveDate, values: Ohlcv) -> Self {
        Self {
            date,
            values,
            validation: ValidationState::Ok,
            history: Vec::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn values(&self) -> Ohlcv {
        self.values
    }

    pub fn validation(&self) -> ValidationState {
        self.validation
    }

    pub fn history(&self) -> &[AuditEntry] {
        &self.history
    }

    /// Overwrite prices in place and append an `Update` entry.
    pub fn update(&mut self, values: Ohlcv, source: impl Into<String>) {
        self.values = values;
        self.history.push(AuditEntry {
            operation: ChangeOperation::Update,
            values,
            source: source.into(),
        });
    }

    pub(crate) fn set_validation(&mut self, state: ValidationState) {
        self.validation = state;
    }
}

/// A raw price observation as handed over by a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub symbol: String,
    pub date: NaiveDate,
    pub values: Ohlcv,
}
