//! Multi-day period aggregation over a shared date axis.

use super::{ReconciliationEngine, ReconciliationError, SOURCE_PERIOD};
use crate::domain::{Ohlcv, Quote, QuoteSeries};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::debug;

impl ReconciliationEngine<'_> {
    /// Build one quote per `period` consecutive dates of `dates`.
    ///
    /// `dates` is the date axis of the whole set (duplicates and order do not
    /// matter), so buckets line up across series. Buckets count calendar slots
    /// on that axis, not days present in this series. Within a bucket: open is
    /// the first present open, close the last present close, high/low the
    /// extremes, volume the sum. The quote is dated at the bucket's last slot.
    /// A bucket with no present day yields nothing; a trailing partial bucket
    /// is dropped.
    pub fn aggregate_period(
        &self,
        series: &QuoteSeries,
        period: usize,
        dates: &[NaiveDate],
    ) -> Result<QuoteSeries, ReconciliationError> {
        if period == 0 {
            return Err(ReconciliationError::InvalidPeriod);
        }
        let axis: Vec<NaiveDate> = dates.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if axis.len() < period {
            return Err(ReconciliationError::PeriodExceedsAvailableDates {
                period,
                available: axis.len(),
            });
        }

        let mut out = QuoteSeries::new(series.symbol(), series.display_name(), series.time_frame())
            .with_slot(series.slot())
            .with_autorun_flag(series.autorun_flag());

        for bucket in axis.chunks_exact(period) {
            let Some(&bucket_date) = bucket.last() else {
                continue;
            };
            match aggregate_bucket(series, bucket) {
                Some(values) => {
                    out.add_quote(Quote::new(bucket_date, values, SOURCE_PERIOD));
                }
                None => debug!(symbol = series.symbol(), date = %bucket_date, "no data in period"),
            }
        }

        out.refresh_observed_bounds();
        Ok(out)
    }
}

fn aggregate_bucket(series: &QuoteSeries, bucket: &[NaiveDate]) -> Option<Ohlcv> {
    let mut present = bucket.iter().filter_map(|d| series.quote(*d)).map(Quote::values);
    let first = present.next()?;
    Some(present.fold(first, |acc, v| Ohlcv {
        open: acc.open,
        high: acc.high.max(v.high),
        low: acc.low.min(v.low),
        close: v.close,
        volume: acc.volume + v.volume,
    }))
}
