//! SeriesSet: one storage location's catalog and series, held fully in memory.
//!
//! A set is loaded whole, mutated through the reconciliation engine, and
//! written back whole (see [`SeriesSet::persist`]).

mod persist;

use crate::codec::directory::MAX_CATALOG_ENTRIES;
use crate::codec::{CatalogLayout, CodecError};
use crate::data::feed::FeedBatch;
use crate::data::report::{ReportError, ValidationFinding};
use crate::data::{audit, AUDIT_DIR};
use crate::domain::{Observation, Quote, QuoteSeries, TimeFrame, MAX_SYMBOL_LEN};
use crate::engine::{ReconciliationEngine, ReconciliationError, UpsertStats};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid symbol {symbol:?}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    #[error("a series set holds at most {max} series")]
    TooManySeries { max: usize },
}

/// How a feed treats symbols the set does not know yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedMode {
    /// Only update series already in the set.
    Update,
    /// Create a series for every unknown symbol.
    Import,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub quotes: UpsertStats,
    pub created_series: usize,
    pub unknown_symbols: usize,
}

/// The in-memory form of one storage location.
#[derive(Debug)]
pub struct SeriesSet {
    storage_location: PathBuf,
    series: Vec<QuoteSeries>,
    dirty: bool,
    layout: Option<CatalogLayout>,
}

impl SeriesSet {
    /// An empty set that has never been written.
    pub fn new(storage_location: impl Into<PathBuf>) -> Self {
        Self {
            storage_location: storage_location.into(),
            series: Vec::new(),
            dirty: false,
            layout: None,
        }
    }

    pub fn storage_location(&self) -> &Path {
        &self.storage_location
    }

    /// Catalog layout found on disk at load time; `None` for a new set.
    pub fn layout(&self) -> Option<CatalogLayout> {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuoteSeries> {
        self.series.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut QuoteSeries> {
        self.series.iter_mut()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(QuoteSeries::symbol)
    }

    fn position(&self, symbol: &str) -> Option<usize> {
        self.series
            .iter()
            .position(|s| s.symbol().eq_ignore_ascii_case(symbol.trim()))
    }

    pub fn series(&self, symbol: &str) -> Option<&QuoteSeries> {
        self.position(symbol).map(|i| &self.series[i])
    }

    pub fn series_mut(&mut self, symbol: &str) -> Option<&mut QuoteSeries> {
        let i = self.position(symbol)?;
        Some(&mut self.series[i])
    }

    pub fn quote(&self, symbol: &str, date: NaiveDate) -> Option<&Quote> {
        self.series(symbol)?.quote(date)
    }

    pub fn date_range(&self, symbol: &str) -> Option<(NaiveDate, NaiveDate)> {
        self.series(symbol)?.date_range()
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Add a series, or return the existing one with the same symbol.
    ///
    /// A new series takes slot N+1 and marks the set dirty.
    pub fn add_series(&mut self, series: QuoteSeries) -> Result<&mut QuoteSeries, StoreError> {
        if let Some(i) = self.position(series.symbol()) {
            return Ok(&mut self.series[i]);
        }
        validate_symbol(series.symbol())?;
        if self.series.len() >= MAX_CATALOG_ENTRIES {
            return Err(StoreError::TooManySeries {
                max: MAX_CATALOG_ENTRIES,
            });
        }

        let slot = (self.series.len() + 1) as u16;
        info!(symbol = series.symbol(), slot, "adding series");
        self.series.push(series.with_slot(slot));
        self.dirty = true;
        let last = self.series.len() - 1;
        Ok(&mut self.series[last])
    }

    /// Remove a series; later series shift down one slot.
    pub fn remove_series(&mut self, symbol: &str) -> Option<QuoteSeries> {
        let removed = self.series.remove(self.position(symbol)?);
        info!(symbol = removed.symbol(), "removing series");
        self.renumber_slots();
        self.dirty = true;
        Some(removed)
    }

    fn renumber_slots(&mut self) {
        for (index, series) in self.series.iter_mut().enumerate() {
            series.set_slot((index + 1) as u16);
        }
    }

    /// True when the set or any of its series changed since load or last persist.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.series.iter().any(QuoteSeries::is_modified)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Distinct dates across every series, ascending.
    pub fn all_dates(&self) -> Vec<NaiveDate> {
        self.series
            .iter()
            .flat_map(QuoteSeries::dates)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every quote whose last validation is not `Ok`, by series then date.
    pub fn findings(&self) -> Vec<ValidationFinding> {
        self.series
            .iter()
            .flat_map(|s| {
                s.quotes()
                    .filter(|q| !q.validation().is_ok())
                    .map(|q| ValidationFinding {
                        symbol: s.symbol().to_string(),
                        date: q.date(),
                        state: q.validation(),
                    })
            })
            .collect()
    }

    /// All quotes as observations, by symbol then date, within `[from, to]` when given.
    pub fn observations(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Vec<Observation> {
        let mut ordered: Vec<&QuoteSeries> = self.series.iter().collect();
        ordered.sort_by(|a, b| a.symbol().cmp(b.symbol()));

        ordered
            .into_iter()
            .flat_map(|s| {
                s.quotes()
                    .filter(move |q| from.map_or(true, |f| q.date() >= f) && to.map_or(true, |t| q.date() <= t))
                    .map(move |q| Observation {
                        symbol: s.symbol().to_string(),
                        date: q.date(),
                        values: q.values(),
                    })
            })
            .collect()
    }

    // ── Reconciliation across the set ──────────────────────────────

    /// Apply a feed batch to every matching series.
    ///
    /// In [`FeedMode::Import`] unknown symbols get a new daily series; a symbol
    /// that cannot be added is logged and its observations skipped.
    pub fn apply_feed(
        &mut self,
        engine: &ReconciliationEngine<'_>,
        batch: &FeedBatch,
        mode: FeedMode,
        source: &str,
    ) -> FeedStats {
        let mut stats = FeedStats::default();
        let symbols: Vec<String> = batch.symbols().map(str::to_string).collect();

        for symbol in symbols {
            let series = match (self.position(&symbol), mode) {
                (Some(i), _) => &mut self.series[i],
                (None, FeedMode::Update) => {
                    stats.unknown_symbols += 1;
                    continue;
                }
                (None, FeedMode::Import) => {
                    match self.add_series(QuoteSeries::new(symbol.as_str(), symbol.as_str(), TimeFrame::Daily)) {
                        Ok(series) => {
                            stats.created_series += 1;
                            series
                        }
                        Err(e) => {
                            warn!(%symbol, error = %e, "cannot import series");
                            stats.unknown_symbols += 1;
                            continue;
                        }
                    }
                }
            };

            let applied = engine.apply_observations(series, batch.for_symbol(&symbol), source);
            stats.quotes.inserted += applied.inserted;
            stats.quotes.updated += applied.updated;
            stats.quotes.rejected += applied.rejected;
        }

        if stats.unknown_symbols > 0 && mode == FeedMode::Update {
            info!(count = stats.unknown_symbols, "feed symbols not in this set were ignored");
        }
        stats
    }

    /// Aggregate every series into a new set at `destination` over this set's shared date axis.
    ///
    /// The new set is not written; call [`SeriesSet::persist`] on it.
    pub fn aggregate_period(
        &self,
        engine: &ReconciliationEngine<'_>,
        period: usize,
        destination: impl Into<PathBuf>,
    ) -> Result<SeriesSet, ReconciliationError> {
        let axis = self.all_dates();
        let mut out = SeriesSet::new(destination);
        for series in &self.series {
            out.series.push(engine.aggregate_period(series, period, &axis)?);
        }
        out.renumber_slots();
        out.dirty = true;
        Ok(out)
    }

    /// Write each series' history to `<storage>/Audit/<symbol>.csv`.
    pub fn write_audit_trail(&self) -> Result<usize, ReportError> {
        let dir = self.storage_location.join(AUDIT_DIR);
        let mut written = 0;
        for series in &self.series {
            if audit::write_audit_trail(&dir, series)?.is_some() {
                written += 1;
            }
        }
        Ok(written)
    }
}

fn validate_symbol(symbol: &str) -> Result<(), StoreError> {
    let reason = if symbol.is_empty() {
        "symbol is empty".to_string()
    } else if symbol.len() > MAX_SYMBOL_LEN {
        format!("longer than {MAX_SYMBOL_LEN} characters")
    } else if !symbol.is_ascii() {
        "not ASCII".to_string()
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidSymbol {
        symbol: symbol.to_string(),
        reason,
    })
}
