//! Reconciliation engine.
//!
//! Merges observations and corrections into a [`QuoteSeries`], runs the
//! validation passes, and synthesizes extra days and period aggregates.
//! The engine holds only a borrowed non-trading-day calendar; every series
//! it touches is passed in explicitly.

mod period;
mod validation;

use crate::data::report::{ReportError, ReportRow, ReportSink};
use crate::domain::{
    Correction, CorrectionKind, NonTradingDays, Observation, Ohlcv, Quote, QuoteSeries,
    ValidationState,
};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Audit source for values written by corrections.
pub const SOURCE_CORRECTIONS: &str = "Corrections";
/// Audit source for synthesized extra days.
pub const SOURCE_EXTRA_DAY: &str = "ExtraDay";
/// Audit source for period aggregates.
pub const SOURCE_PERIOD: &str = "Period";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconciliationError {
    #[error("correction for {symbol} on {date} falls outside the series' date range")]
    CorrectionOutOfRange { symbol: String, date: NaiveDate },

    #[error("correction for {found} cannot be applied to series {expected}")]
    SymbolMismatch { expected: String, found: String },

    #[error("the period selected ({period}) is longer than the number of days available ({available})")]
    PeriodExceedsAvailableDates { period: usize, available: usize },

    #[error("period length must be at least one day")]
    InvalidPeriod,
}

/// What [`ReconciliationEngine::upsert_observation`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(ValidationState),
    Updated(ValidationState),
    /// New quote on a non-trading day; dropped.
    Rejected,
}

/// What [`ReconciliationEngine::apply_correction`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    Upserted(UpsertOutcome),
    Removed,
    NotPresent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub rejected: usize,
}

impl UpsertStats {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted(_) => self.inserted += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
            UpsertOutcome::Rejected => self.rejected += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrectionStats {
    pub applied: usize,
    pub skipped: usize,
}

pub struct ReconciliationEngine<'c> {
    calendar: &'c NonTradingDays,
}

impl<'c> ReconciliationEngine<'c> {
    pub fn new(calendar: &'c NonTradingDays) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &NonTradingDays {
        self.calendar
    }

    // ── Observations ────────────────────────────────────────────────

    /// Insert a new quote or overwrite an existing one, then validate it.
    ///
    /// A new quote that validates as `NonTradingDay` is dropped. An existing
    /// quote keeps its history; the overwrite appends an `Update` entry.
    pub fn upsert_observation(
        &self,
        series: &mut QuoteSeries,
        date: NaiveDate,
        values: Ohlcv,
        source: &str,
    ) -> UpsertOutcome {
        if let Some(quote) = series.quote_mut(date) {
            quote.update(values, source);
            let state = self.validate(quote);
            return UpsertOutcome::Updated(state);
        }

        let state = self.evaluate(date, values);
        if state == ValidationState::NonTradingDay {
            debug!(symbol = series.symbol(), %date, source, "dropping quote on non-trading day");
            return UpsertOutcome::Rejected;
        }

        let mut quote = Quote::new(date, values, source);
        quote.set_validation(state);
        series.add_quote(quote);
        UpsertOutcome::Inserted(state)
    }

    /// Apply a batch of observations in ascending date order.
    ///
    /// Observations for other symbols are ignored.
    pub fn apply_observations<'a>(
        &self,
        series: &mut QuoteSeries,
        observations: impl IntoIterator<Item = &'a Observation>,
        source: &str,
    ) -> UpsertStats {
        let mut matching: Vec<&Observation> = observations
            .into_iter()
            .filter(|o| o.symbol.eq_ignore_ascii_case(series.symbol()))
            .collect();
        matching.sort_by_key(|o| o.date);

        let mut stats = UpsertStats::default();
        for observation in matching {
            stats.record(self.upsert_observation(series, observation.date, observation.values, source));
        }
        debug!(
            symbol = series.symbol(),
            inserted = stats.inserted,
            updated = stats.updated,
            rejected = stats.rejected,
            "observations applied"
        );
        stats
    }

    // ── Corrections ─────────────────────────────────────────────────

    /// Apply one correction. Only dates inside the series' live range qualify.
    pub fn apply_correction(
        &self,
        series: &mut QuoteSeries,
        correction: &Correction,
    ) -> Result<CorrectionOutcome, ReconciliationError> {
        if !correction.applies_to(series.symbol()) {
            return Err(ReconciliationError::SymbolMismatch {
                expected: series.symbol().to_string(),
                found: correction.symbol.clone(),
            });
        }

        let in_range = series
            .date_range()
            .is_some_and(|(first, last)| first <= correction.date && correction.date <= last);
        if !in_range {
            return Err(ReconciliationError::CorrectionOutOfRange {
                symbol: series.symbol().to_string(),
                date: correction.date,
            });
        }

        let outcome = match correction.kind {
            CorrectionKind::RemoveDate => match series.remove_quote(correction.date) {
                Some(_) => CorrectionOutcome::Removed,
                None => CorrectionOutcome::NotPresent,
            },
            CorrectionKind::AddDate | CorrectionKind::CorrectPrices => {
                if series.contains(correction.date) {
                    info!(
                        symbol = series.symbol(),
                        date = %correction.date,
                        kind = %correction.kind,
                        "correction overwrites existing quote"
                    );
                }
                CorrectionOutcome::Upserted(self.upsert_observation(
                    series,
                    correction.date,
                    correction.values,
                    SOURCE_CORRECTIONS,
                ))
            }
        };
        Ok(outcome)
    }

    /// Apply every correction for this series; failures are logged and skipped.
    pub fn apply_corrections(&self, series: &mut QuoteSeries, corrections: &[Correction]) -> CorrectionStats {
        let mut stats = CorrectionStats::default();
        let symbol = series.symbol().to_string();
        for correction in corrections.iter().filter(|c| c.applies_to(&symbol)) {
            match self.apply_correction(series, correction) {
                Ok(_) => stats.applied += 1,
                Err(e) => {
                    debug!(error = %e, "correction skipped");
                    stats.skipped += 1;
                }
            }
        }
        if stats.applied > 0 {
            info!(symbol = series.symbol(), applied = stats.applied, "corrections applied");
        }
        stats
    }

    // ── Non-trading days ────────────────────────────────────────────

    /// Remove every quote on a weekend or listed holiday, returning them.
    pub fn strip_non_trading_days(&self, series: &mut QuoteSeries) -> Vec<Quote> {
        let doomed: Vec<NaiveDate> = series
            .dates()
            .filter(|d| !self.calendar.is_trading_day(*d))
            .collect();

        let removed: Vec<Quote> = doomed.into_iter().filter_map(|d| series.remove_quote(d)).collect();
        if !removed.is_empty() {
            info!(symbol = series.symbol(), removed = removed.len(), "non-trading days stripped");
        }
        removed
    }

    /// Emit every non-trading-day quote to `sink` without touching the series.
    pub fn report_non_trading_days(
        &self,
        series: &QuoteSeries,
        sink: &mut dyn ReportSink,
    ) -> Result<usize, ReportError> {
        let mut emitted = 0;
        for quote in series.quotes().filter(|q| !self.calendar.is_trading_day(q.date())) {
            sink.emit(&ReportRow {
                symbol: series.symbol().to_string(),
                date: quote.date(),
                values: Some(quote.values()),
            })?;
            emitted += 1;
        }
        Ok(emitted)
    }

    // ── Synthesized days ────────────────────────────────────────────

    /// Clone the latest quote onto the next trading day. `None` for an empty series.
    pub fn add_extra_day(&self, series: &mut QuoteSeries) -> Option<NaiveDate> {
        let Some(last) = series.quotes().next_back() else {
            info!(symbol = series.symbol(), "series has no data, cannot add extra day");
            return None;
        };
        let (last_date, values) = (last.date(), last.values());

        let next = self.calendar.next_trading_day(last_date);
        info!(symbol = series.symbol(), date = %next, "adding extra day");
        match self.upsert_observation(series, next, values, SOURCE_EXTRA_DAY) {
            UpsertOutcome::Rejected => None,
            _ => Some(next),
        }
    }

    /// Trading days in `[from, to]` with no quote.
    ///
    /// The bounds default to the series' own first and last dates.
    pub fn missing_days(
        &self,
        series: &QuoteSeries,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Vec<NaiveDate> {
        let range = series.date_range();
        let (Some(from), Some(to)) = (from.or(range.map(|r| r.0)), to.or(range.map(|r| r.1))) else {
            return Vec::new();
        };

        match range {
            Some((first, last)) if from < first || to > last => warn!(
                symbol = series.symbol(),
                %from,
                %to,
                %first,
                %last,
                "requested range extends beyond series data"
            ),
            None => warn!(symbol = series.symbol(), "series has no data"),
            _ => {}
        }

        self.calendar
            .trading_days(from, to)
            .filter(|d| !series.contains(*d))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeFrame;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar() -> Ohlcv {
        Ohlcv::new(10.0, 11.0, 9.0, 10.0, 100.0)
    }

    fn series_with(dates: &[NaiveDate]) -> QuoteSeries {
        let mut s = QuoteSeries::new("BHP", "BHP LTD", TimeFrame::Daily);
        for &d in dates {
            s.add_quote(Quote::new(d, bar(), "Seed"));
        }
        s
    }

    fn correction(date: NaiveDate, kind: CorrectionKind, close: f32) -> Correction {
        Correction {
            symbol: "BHP".into(),
            date,
            kind,
            values: Ohlcv::new(close, close + 1.0, close - 1.0, close, 500.0),
        }
    }

    #[test]
    fn upsert_twice_keeps_one_quote_with_two_entries() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = QuoteSeries::new("BHP", "BHP", TimeFrame::Daily);

        let first = engine.upsert_observation(&mut s, ymd(2014, 5, 9), bar(), "Feed");
        let second = engine.upsert_observation(&mut s, ymd(2014, 5, 9), bar(), "Feed");

        assert_eq!(first, UpsertOutcome::Inserted(ValidationState::Ok));
        assert_eq!(second, UpsertOutcome::Updated(ValidationState::Ok));
        assert_eq!(s.len(), 1);
        let q = s.quote(ymd(2014, 5, 9)).unwrap();
        assert_eq!(q.history().len(), 2);
        assert_eq!(q.values(), bar());
    }

    #[test]
    fn new_quotes_on_non_trading_days_are_dropped() {
        let cal: NonTradingDays = [ymd(2014, 5, 13)].into_iter().collect();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = QuoteSeries::new("BHP", "BHP", TimeFrame::Daily);

        assert_eq!(engine.upsert_observation(&mut s, ymd(2014, 5, 10), bar(), "Feed"), UpsertOutcome::Rejected);
        assert_eq!(engine.upsert_observation(&mut s, ymd(2014, 5, 13), bar(), "Feed"), UpsertOutcome::Rejected);
        assert!(s.is_empty());
        assert!(!s.is_modified());
    }

    #[test]
    fn inconsistent_ohlc_is_kept_but_flagged() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = QuoteSeries::new("BHP", "BHP", TimeFrame::Daily);

        let outcome = engine.upsert_observation(&mut s, ymd(2014, 5, 9), Ohlcv::new(10.0, 9.0, 8.0, 9.5, 1.0), "Feed");
        assert_eq!(outcome, UpsertOutcome::Inserted(ValidationState::HighIsNotHighest));
        assert_eq!(s.quote(ymd(2014, 5, 9)).unwrap().validation(), ValidationState::HighIsNotHighest);
    }

    #[test]
    fn observations_apply_in_date_order_for_matching_symbol() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = QuoteSeries::new("BHP", "BHP", TimeFrame::Daily);
        let obs = vec![
            Observation { symbol: "BHP".into(), date: ymd(2014, 5, 12), values: bar() },
            Observation { symbol: "CBA".into(), date: ymd(2014, 5, 12), values: bar() },
            Observation { symbol: "bhp".into(), date: ymd(2014, 5, 9), values: bar() },
            Observation { symbol: "BHP".into(), date: ymd(2014, 5, 10), values: bar() },
            Observation { symbol: "BHP".into(), date: ymd(2014, 5, 12), values: Ohlcv::flat(10.5, 1.0) },
        ];

        let stats = engine.apply_observations(&mut s, &obs, "Feed");
        assert_eq!(stats, UpsertStats { inserted: 2, updated: 1, rejected: 1 });
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn remove_date_on_absent_day_is_a_no_op() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = series_with(&[ymd(2014, 5, 9), ymd(2014, 5, 13)]);
        s.mark_saved();

        let outcome = engine
            .apply_correction(&mut s, &correction(ymd(2014, 5, 12), CorrectionKind::RemoveDate, 0.0))
            .unwrap();
        assert_eq!(outcome, CorrectionOutcome::NotPresent);
        assert_eq!(s.len(), 2);
        assert!(!s.is_modified());
    }

    #[test]
    fn remove_date_deletes_quote_and_history() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = series_with(&[ymd(2014, 5, 9), ymd(2014, 5, 12), ymd(2014, 5, 13)]);

        let outcome = engine
            .apply_correction(&mut s, &correction(ymd(2014, 5, 12), CorrectionKind::RemoveDate, 0.0))
            .unwrap();
        assert_eq!(outcome, CorrectionOutcome::Removed);
        assert!(s.quote(ymd(2014, 5, 12)).is_none());
    }

    #[test]
    fn add_date_on_existing_day_overwrites() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = series_with(&[ymd(2014, 5, 9), ymd(2014, 5, 12)]);

        engine
            .apply_correction(&mut s, &correction(ymd(2014, 5, 12), CorrectionKind::AddDate, 20.0))
            .unwrap();
        assert_eq!(s.len(), 2);
        let q = s.quote(ymd(2014, 5, 12)).unwrap();
        assert_eq!(q.values().close, 20.0);
        assert_eq!(q.history().last().unwrap().source, SOURCE_CORRECTIONS);
    }

    #[test]
    fn correct_prices_fills_a_gap() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = series_with(&[ymd(2014, 5, 9), ymd(2014, 5, 13)]);

        let outcome = engine
            .apply_correction(&mut s, &correction(ymd(2014, 5, 12), CorrectionKind::CorrectPrices, 12.0))
            .unwrap();
        assert_eq!(outcome, CorrectionOutcome::Upserted(UpsertOutcome::Inserted(ValidationState::Ok)));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn corrections_outside_range_are_skipped() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = series_with(&[ymd(2014, 5, 9), ymd(2014, 5, 12)]);

        let err = engine
            .apply_correction(&mut s, &correction(ymd(2014, 5, 13), CorrectionKind::AddDate, 12.0))
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::CorrectionOutOfRange { .. }));

        let batch = vec![
            correction(ymd(2014, 5, 13), CorrectionKind::AddDate, 12.0),
            correction(ymd(2014, 5, 9), CorrectionKind::CorrectPrices, 9.5),
            Correction { symbol: "CBA".into(), ..correction(ymd(2014, 5, 9), CorrectionKind::RemoveDate, 0.0) },
        ];
        let stats = engine.apply_corrections(&mut s, &batch);
        assert_eq!(stats, CorrectionStats { applied: 1, skipped: 1 });
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn batch_corrections_match_symbol_case_insensitively() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = series_with(&[ymd(2014, 5, 9), ymd(2014, 5, 12), ymd(2014, 5, 13)]);

        let batch = vec![
            Correction { symbol: "bhp".into(), ..correction(ymd(2014, 5, 12), CorrectionKind::RemoveDate, 0.0) },
            correction(ymd(2014, 5, 13), CorrectionKind::CorrectPrices, 14.0),
            Correction { symbol: "CBA".into(), ..correction(ymd(2014, 5, 9), CorrectionKind::RemoveDate, 0.0) },
        ];
        let stats = engine.apply_corrections(&mut s, &batch);

        assert_eq!(stats, CorrectionStats { applied: 2, skipped: 0 });
        assert!(s.quote(ymd(2014, 5, 12)).is_none());
        assert!(s.quote(ymd(2014, 5, 9)).is_some());
        assert_eq!(s.quote(ymd(2014, 5, 13)).unwrap().values().close, 14.0);
        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            serde_json::json!({ "applied": 2, "skipped": 0 })
        );
    }

    #[test]
    fn correction_for_another_symbol_is_rejected() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = series_with(&[ymd(2014, 5, 9)]);
        let c = Correction { symbol: "CBA".into(), ..correction(ymd(2014, 5, 9), CorrectionKind::RemoveDate, 0.0) };
        assert!(matches!(
            engine.apply_correction(&mut s, &c),
            Err(ReconciliationError::SymbolMismatch { .. })
        ));
    }

    #[test]
    fn strip_removes_weekend_and_holiday_quotes_only() {
        let cal: NonTradingDays = [ymd(2014, 5, 13)].into_iter().collect();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = QuoteSeries::new("BHP", "BHP", TimeFrame::Daily);
        for d in [ymd(2014, 5, 9), ymd(2014, 5, 10), ymd(2014, 5, 12), ymd(2014, 5, 13), ymd(2014, 5, 14)] {
            s.add_quote(Quote::stored(d, bar()));
        }

        let removed = engine.strip_non_trading_days(&mut s);
        let removed_dates: Vec<_> = removed.iter().map(|q| q.date()).collect();
        assert_eq!(removed_dates, vec![ymd(2014, 5, 10), ymd(2014, 5, 13)]);
        assert_eq!(s.dates().collect::<Vec<_>>(), vec![ymd(2014, 5, 9), ymd(2014, 5, 12), ymd(2014, 5, 14)]);
    }

    #[test]
    fn report_mode_leaves_series_untouched() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = QuoteSeries::new("BHP", "BHP", TimeFrame::Daily);
        for d in [ymd(2014, 5, 9), ymd(2014, 5, 10), ymd(2014, 5, 11)] {
            s.add_quote(Quote::stored(d, bar()));
        }

        let mut sink: Vec<ReportRow> = Vec::new();
        let emitted = engine.report_non_trading_days(&s, &mut sink).unwrap();
        assert_eq!(emitted, 2);
        assert_eq!(sink[0].date, ymd(2014, 5, 10));
        assert_eq!(sink[0].values, Some(bar()));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn extra_day_clones_last_quote_onto_next_trading_day() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = QuoteSeries::new("BHP", "BHP", TimeFrame::Daily);
        s.add_quote(Quote::new(ymd(2014, 5, 8), Ohlcv::flat(9.0, 50.0), "Feed"));
        s.add_quote(Quote::new(ymd(2014, 5, 9), Ohlcv::flat(10.0, 100.0), "Feed"));

        assert_eq!(engine.add_extra_day(&mut s), Some(ymd(2014, 5, 12)));
        let extra = s.quote(ymd(2014, 5, 12)).unwrap();
        assert_eq!(extra.values(), Ohlcv::flat(10.0, 100.0));
        assert_eq!(extra.history()[0].source, SOURCE_EXTRA_DAY);
    }

    #[test]
    fn extra_day_skips_holidays() {
        let cal: NonTradingDays = [ymd(2014, 5, 12)].into_iter().collect();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = series_with(&[ymd(2014, 5, 9)]);
        assert_eq!(engine.add_extra_day(&mut s), Some(ymd(2014, 5, 13)));
    }

    #[test]
    fn extra_day_on_empty_series_fails_softly() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut s = QuoteSeries::new("NEW", "NEW", TimeFrame::Daily);
        assert_eq!(engine.add_extra_day(&mut s), None);
        assert!(s.is_empty());
    }

    #[test]
    fn missing_days_defaults_to_series_bounds() {
        let cal: NonTradingDays = [ymd(2014, 5, 14)].into_iter().collect();
        let engine = ReconciliationEngine::new(&cal);
        let s = series_with(&[ymd(2014, 5, 9), ymd(2014, 5, 13), ymd(2014, 5, 16)]);

        assert_eq!(engine.missing_days(&s, None, None), vec![ymd(2014, 5, 12), ymd(2014, 5, 15)]);
    }

    #[test]
    fn missing_days_honours_explicit_range() {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let s = series_with(&[ymd(2014, 5, 9)]);

        let missing = engine.missing_days(&s, Some(ymd(2014, 5, 8)), Some(ymd(2014, 5, 12)));
        assert_eq!(missing, vec![ymd(2014, 5, 8), ymd(2014, 5, 12)]);

        let empty = QuoteSeries::new("NEW", "NEW", TimeFrame::Daily);
        assert!(engine.missing_days(&empty, None, None).is_empty());
    }
}
