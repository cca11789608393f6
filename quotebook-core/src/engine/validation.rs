//! Per-quote validation and the day-over-day tolerance pass.

use super::ReconciliationEngine;
use crate::domain::{NonTradingDays, Ohlcv, Quote, QuoteSeries, ValidationState};
use chrono::NaiveDate;
use tracing::debug;

/// Field order of the tolerance pass. When several fields breach, the last one wins.
const TOLERANCE_FIELDS: [(fn(&Ohlcv) -> f32, ValidationState); 4] = [
    (open, ValidationState::OpenValueOutOfTolerance),
    (close, ValidationState::CloseValueOutOfTolerance),
    (high, ValidationState::HighValueOutOfTolerance),
    (low, ValidationState::LowValueOutOfTolerance),
];

fn open(v: &Ohlcv) -> f32 {
    v.open
}

fn close(v: &Ohlcv) -> f32 {
    v.close
}

fn high(v: &Ohlcv) -> f32 {
    v.high
}

fn low(v: &Ohlcv) -> f32 {
    v.low
}

impl ReconciliationEngine<'_> {
    /// Classify a day's values; the first matching condition wins.
    pub fn evaluate(&self, date: NaiveDate, v: Ohlcv) -> ValidationState {
        if NonTradingDays::is_weekend(date) || self.calendar.contains(date) {
            ValidationState::NonTradingDay
        } else if v.high < v.open || v.high < v.low || v.high < v.close {
            ValidationState::HighIsNotHighest
        } else if v.low > v.open || v.low > v.high || v.low > v.close {
            ValidationState::LowIsNotLowest
        } else {
            ValidationState::Ok
        }
    }

    /// Re-run [`evaluate`](Self::evaluate) and store the result on the quote.
    pub fn validate(&self, quote: &mut Quote) -> ValidationState {
        let state = self.evaluate(quote.date(), quote.values());
        quote.set_validation(state);
        state
    }

    /// Validate every quote in the series; returns how many are not `Ok`.
    pub fn validate_series(&self, series: &mut QuoteSeries) -> usize {
        series
            .quotes_mut()
            .map(|q| self.validate(q))
            .filter(|s| !s.is_ok())
            .count()
    }

    /// Flag days whose prices moved more than `max_fractional_change` from the prior day.
    ///
    /// Every quote is re-validated first so stale tolerance flags clear. For
    /// each adjacent pair the change is `larger / smaller - 1` per field.
    /// Returns the number of quotes flagged out of tolerance.
    pub fn tolerance_check(&self, series: &mut QuoteSeries, max_fractional_change: f64) -> usize {
        self.validate_series(series);

        let mut previous: Option<Ohlcv> = None;
        let mut flagged = 0;
        for quote in series.quotes_mut() {
            let current = quote.values();
            if let Some(prior) = previous {
                let mut breach = None;
                for (field, state) in TOLERANCE_FIELDS {
                    if fractional_change(field(&prior), field(&current)) > max_fractional_change {
                        breach = Some(state);
                    }
                }
                if let Some(state) = breach {
                    debug!(date = %quote.date(), %state, "value out of tolerance");
                    quote.set_validation(state);
                    flagged += 1;
                }
            }
            previous = Some(current);
        }
        flagged
    }
}

/// Larger-over-smaller ratio minus one. A zero against a non-zero is infinite;
/// two zeros are NaN and never breach.
fn fractional_change(a: f32, b: f32) -> f64 {
    let (a, b) = (a as f64, b as f64);
    if a > b {
        a / b - 1.0
    } else {
        b / a - 1.0
    }
}
