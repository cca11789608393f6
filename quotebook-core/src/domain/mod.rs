//! Domain types for quote series

pub mod calendar;
pub mod correction;
pub mod quote;
pub mod series;

pub use calendar::NonTradingDays;
pub use correction::{Correction, CorrectionKind};
pub use quote::{AuditEntry, ChangeOperation, Observation, Ohlcv, Quote, ValidationState};
pub use series::{QuoteSeries, TimeFrame, MAX_DISPLAY_NAME_LEN, MAX_SYMBOL_LEN};
