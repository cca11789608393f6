//! QuoteSeries: one symbol's date-indexed price history.

use super::quote::Quote;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Width of the symbol field in the catalog.
pub const MAX_SYMBOL_LEN: usize = 14;
/// Width of the display name field in the catalog.
pub const MAX_DISPLAY_NAME_LEN: usize = 16;

/// Periodicity marker stored per series in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeFrame {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Intraday,
    /// A marker byte this crate does not interpret, kept verbatim.
    Other(u8),
}

impl TimeFrame {
    pub fn from_marker(marker: u8) -> Self {
        match marker.to_ascii_uppercase() {
            b'D' => TimeFrame::Daily,
            b'W' => TimeFrame::Weekly,
            b'M' => TimeFrame::Monthly,
            b'Q' => TimeFrame::Quarterly,
            b'Y' => TimeFrame::Yearly,
            b'I' => TimeFrame::Intraday,
            _ => TimeFrame::Other(marker),
        }
    }

    pub fn marker(self) -> u8 {
        match self {
            TimeFrame::Daily => b'D',
            TimeFrame::Weekly => b'W',
            TimeFrame::Monthly => b'M',
            TimeFrame::Quarterly => b'Q',
            TimeFrame::Yearly => b'Y',
            TimeFrame::Intraday => b'I',
            TimeFrame::Other(m) => m,
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker() as char)
    }
}

/// An ordered, date-indexed series of quotes for one symbol.
///
/// `first_observed` / `last_observed` mirror the catalog's cached bounds and
/// go stale as quotes change; [`QuoteSeries::refresh_observed_bounds`] resyncs
/// them before the catalog is rewritten. The live bounds are always available
/// from [`QuoteSeries::date_range`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSeries {
    symbol: String,
    display_name: String,
    time_frame: TimeFrame,
    slot: u16,
    autorun_flag: u8,
    first_observed: Option<NaiveDate>,
    last_observed: Option<NaiveDate>,
    quotes: BTreeMap<NaiveDate, Quote>,
    #[serde(skip)]
    modified: bool,
}

impl QuoteSeries {
    /// A new, empty series. The display name is cut to the catalog width.
    pub fn new(symbol: impl Into<String>, display_name: impl Into<String>, time_frame: TimeFrame) -> Self {
        Self {
            symbol: symbol.into().trim().to_string(),
            display_name: fit_display_name(display_name.into()),
            time_frame,
            slot: 0,
            autorun_flag: b'*',
            first_observed: None,
            last_observed: None,
            quotes: BTreeMap::new(),
            modified: false,
        }
    }

    pub fn with_slot(mut self, slot: u16) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_autorun_flag(mut self, flag: u8) -> Self {
        self.autorun_flag = flag;
        self
    }

    pub fn with_observed_bounds(mut self, first: Option<NaiveDate>, last: Option<NaiveDate>) -> Self {
        self.first_observed = first;
        self.last_observed = last;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = fit_display_name(name.into());
        self.modified = true;
    }

    pub fn time_frame(&self) -> TimeFrame {
        self.time_frame
    }

    /// File slot; 0 until the series is placed in a set.
    pub fn slot(&self) -> u16 {
        self.slot
    }

    pub(crate) fn set_slot(&mut self, slot: u16) {
        self.slot = slot;
    }

    pub fn autorun_flag(&self) -> u8 {
        self.autorun_flag
    }

    /// Cached first date as last read from or written to the catalog.
    pub fn first_observed(&self) -> Option<NaiveDate> {
        self.first_observed
    }

    /// Cached last date as last read from or written to the catalog.
    pub fn last_observed(&self) -> Option<NaiveDate> {
        self.last_observed
    }

    pub fn refresh_observed_bounds(&mut self) {
        self.first_observed = self.first_date();
        self.last_observed = self.last_date();
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.quotes.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.quotes.keys().next_back().copied()
    }

    /// Live `(first, last)` dates, `None` when the series is empty.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.first_date()?, self.last_date()?))
    }

    pub fn quote(&self, date: NaiveDate) -> Option<&Quote> {
        self.quotes.get(&date)
    }

    pub(crate) fn quote_mut(&mut self, date: NaiveDate) -> Option<&mut Quote> {
        let quote = self.quotes.get_mut(&date)?;
        self.modified = true;
        Some(quote)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.quotes.contains_key(&date)
    }

    /// Quotes in ascending date order.
    pub fn quotes(&self) -> impl DoubleEndedIterator<Item = &Quote> + ExactSizeIterator {
        self.quotes.values()
    }

    /// Validation state is not persisted, so touching it does not mark the series modified.
    pub(crate) fn quotes_mut(&mut self) -> impl Iterator<Item = &mut Quote> {
        self.quotes.values_mut()
    }

    pub fn dates(&self) -> impl DoubleEndedIterator<Item = NaiveDate> + '_ {
        self.quotes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Insert or replace the quote at its date, returning the one replaced.
    pub fn add_quote(&mut self, quote: Quote) -> Option<Quote> {
        self.modified = true;
        self.quotes.insert(quote.date(), quote)
    }

    pub fn remove_quote(&mut self, date: NaiveDate) -> Option<Quote> {
        let removed = self.quotes.remove(&date);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    /// Insert a quote read from disk without marking the series modified.
    pub(crate) fn load_stored(&mut self, quote: Quote) {
        self.quotes.insert(quote.date(), quote);
    }

    /// True when quotes or metadata changed since load or last save.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn mark_saved(&mut self) {
        self.modified = false;
    }
}

fn fit_display_name(name: String) -> String {
    let name = name.trim();
    name.chars().take(MAX_DISPLAY_NAME_LEN).collect()
}
