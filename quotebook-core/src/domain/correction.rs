//! Manual corrections applied once per run against matching series.

use super::quote::Ohlcv;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionKind {
    /// Insert the day, or overwrite it when already present.
    AddDate,
    /// Delete the day and its history; absent days are left alone.
    RemoveDate,
    /// Overwrite the day's prices, inserting it when missing.
    CorrectPrices,
}

impl fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionKind::AddDate => f.write_str("AddDate"),
            CorrectionKind::RemoveDate => f.write_str("RemoveDate"),
            CorrectionKind::CorrectPrices => f.write_str("CorrectPrices"),
        }
    }
}

impl FromStr for CorrectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adddate" => Ok(CorrectionKind::AddDate),
            "removedate" => Ok(CorrectionKind::RemoveDate),
            "correctprices" => Ok(CorrectionKind::CorrectPrices),
            other => Err(format!("unknown correction type: {other}")),
        }
    }
}

/// One manual override for one symbol on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub symbol: String,
    pub date: NaiveDate,
    pub kind: CorrectionKind,
    pub values: Ohlcv,
}

impl Correction {
    pub fn applies_to(&self, symbol: &str) -> bool {
        self.symbol.trim().eq_ignore_ascii_case(symbol.trim())
    }
}
