//! Quotebook Core: legacy price container codecs, quote series, reconciliation.
//!
//! This crate contains everything that touches a storage location:
//! - Legacy float and date codec, catalog and series file codecs
//! - Quote, audit and series domain types plus the non-trading-day calendar
//! - The reconciliation engine (upsert, corrections, validation, extra days, periods)
//! - SeriesSet load/persist with staged atomic writes
//! - CSV adapters for feeds, corrections, non-trading days, reports and audit trails

pub mod codec;
pub mod data;
pub mod domain;
pub mod engine;
pub mod store;

pub use domain::{
    Correction, CorrectionKind, NonTradingDays, Observation, Ohlcv, Quote, QuoteSeries, TimeFrame,
    ValidationState,
};
pub use engine::{ReconciliationEngine, ReconciliationError};
pub use store::{FeedMode, FeedStats, SeriesSet, StoreError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the types a runner moves between threads are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Quote>();
        require_sync::<Quote>();
        require_send::<QuoteSeries>();
        require_sync::<QuoteSeries>();
        require_send::<SeriesSet>();
        require_sync::<SeriesSet>();
        require_send::<NonTradingDays>();
        require_sync::<NonTradingDays>();
        require_send::<Correction>();
        require_sync::<Correction>();

        require_send::<codec::CodecError>();
        require_sync::<codec::CodecError>();
        require_send::<StoreError>();
        require_sync::<StoreError>();
        require_send::<ReconciliationEngine<'static>>();
        require_sync::<ReconciliationEngine<'static>>();
    }
}
