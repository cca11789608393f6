//! One job per operating mode, each run against a single series set.
//!
//! Every job loads the set fresh from its storage location. Jobs that
//! change quotes persist only when the set came out dirty.

use crate::config::{Defaults, ListConfig};
use crate::error::RunError;
use chrono::NaiveDate;
use quotebook_core::data::{
    load_non_trading_days, read_corrections_file, read_feed_file, write_feed, write_findings,
    CsvReportSink, ReportKind, ReportRow, ReportSink,
};
use quotebook_core::engine::CorrectionStats;
use quotebook_core::{
    Correction, FeedMode, FeedStats, NonTradingDays, Observation, ReconciliationEngine, SeriesSet,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Audit source for observations applied by `update`.
pub const SOURCE_FEED: &str = "Feed";
/// Audit source for observations applied by `import`.
pub const SOURCE_IMPORT: &str = "Import";

// ── Context ─────────────────────────────────────────────────────────

/// Inputs shared by every set in a batch, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    pub calendar: NonTradingDays,
    pub corrections: Vec<Correction>,
    pub tolerance: f64,
}

impl JobContext {
    pub fn new(calendar: NonTradingDays, tolerance: f64) -> Self {
        Self {
            calendar,
            corrections: Vec::new(),
            tolerance,
        }
    }

    pub fn with_corrections(mut self, corrections: Vec<Correction>) -> Self {
        self.corrections = corrections;
        self
    }

    /// Load the calendar and corrections named in `defaults`.
    ///
    /// A bad non-trading days file degrades to weekends only; a bad or
    /// missing corrections file fails the run.
    pub fn from_defaults(defaults: &Defaults) -> Result<Self, RunError> {
        let calendar = match &defaults.non_trading_days {
            Some(path) => load_non_trading_days(path, &defaults.holiday_format()),
            None => {
                info!("no non-trading days file configured, using weekends only");
                NonTradingDays::new()
            }
        };
        let corrections = match &defaults.corrections {
            Some(path) => read_corrections_file(path, &defaults.corrections_date_format)?,
            None => Vec::new(),
        };
        if !corrections.is_empty() {
            info!(count = corrections.len(), "corrections loaded");
        }
        Ok(Self::new(calendar, defaults.tolerance).with_corrections(corrections))
    }

    pub fn engine(&self) -> ReconciliationEngine<'_> {
        ReconciliationEngine::new(&self.calendar)
    }
}

// ── Jobs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Job {
    /// Remove weekend and holiday quotes.
    Clean,
    /// Clone each series' last quote onto the next trading day.
    ExtraDay,
    /// Report weekend and holiday quotes without removing them.
    AddedDays { output_dir: PathBuf },
    /// Report trading days with no quote.
    MissingDays {
        output_dir: PathBuf,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    /// Write every quote as a feed CSV.
    Export {
        output_dir: PathBuf,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        append: bool,
    },
    /// Apply a feed, creating series for unknown symbols.
    Import { feed: Option<PathBuf> },
    /// Aggregate into a new set under `destination/<list name>`.
    Period { days: usize, destination: PathBuf },
    /// Validate and tolerance-check, writing findings only.
    Check { output_dir: PathBuf },
    /// Feed, corrections, tolerance check, optional extra day, persist.
    Update { feed: Option<PathBuf> },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Clean => "clean",
            Job::ExtraDay => "extra-day",
            Job::AddedDays { .. } => "added-days",
            Job::MissingDays { .. } => "missing-days",
            Job::Export { .. } => "export",
            Job::Import { .. } => "import",
            Job::Period { .. } => "period",
            Job::Check { .. } => "check",
            Job::Update { .. } => "update",
        }
    }

    pub fn run(&self, list: &ListConfig, ctx: &JobContext) -> Result<JobReport, RunError> {
        debug!(job = self.name(), list = %list.name, storage = %list.storage.display(), "running job");
        match self {
            Job::Clean => clean(list, ctx),
            Job::ExtraDay => extra_day(list, ctx),
            Job::AddedDays { output_dir } => added_days(list, ctx, output_dir),
            Job::MissingDays { output_dir, from, to } => missing_days(
                list,
                ctx,
                output_dir,
                from.or(list.start_date),
                to.or(list.end_date),
            ),
            Job::Export {
                output_dir,
                from,
                to,
                append,
            } => export(list, output_dir, from.or(list.start_date), to.or(list.end_date), *append),
            Job::Import { feed } => import(list, ctx, feed.as_deref()),
            Job::Period { days, destination } => period(list, ctx, *days, destination),
            Job::Check { output_dir } => check(list, ctx, output_dir),
            Job::Update { feed } => update(list, ctx, feed.as_deref()),
        }
    }
}

/// What a job did to one set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobReport {
    pub series: usize,
    /// Quotes removed, added, reported or exported, depending on the job.
    pub rows: usize,
    pub feed: Option<FeedStats>,
    pub corrections: Option<CorrectionStats>,
    pub findings: usize,
    pub persisted: bool,
    pub output: Option<PathBuf>,
}

fn clean(list: &ListConfig, ctx: &JobContext) -> Result<JobReport, RunError> {
    let mut set = SeriesSet::load(&list.storage)?;
    let engine = ctx.engine();
    let removed: usize = set
        .iter_mut()
        .map(|series| engine.strip_non_trading_days(series).len())
        .sum();

    Ok(JobReport {
        series: set.len(),
        rows: removed,
        persisted: persist_if_dirty(&mut set)?,
        ..JobReport::default()
    })
}

fn extra_day(list: &ListConfig, ctx: &JobContext) -> Result<JobReport, RunError> {
    let mut set = SeriesSet::load(&list.storage)?;
    let engine = ctx.engine();
    let added = set
        .iter_mut()
        .filter_map(|series| engine.add_extra_day(series))
        .count();

    Ok(JobReport {
        series: set.len(),
        rows: added,
        persisted: persist_if_dirty(&mut set)?,
        ..JobReport::default()
    })
}

fn added_days(list: &ListConfig, ctx: &JobContext, output_dir: &Path) -> Result<JobReport, RunError> {
    let set = SeriesSet::load(&list.storage)?;
    let engine = ctx.engine();
    let path = output_dir.join(report_file_name(&list.name, "added_days"));

    let mut sink = CsvReportSink::new(create_output(&path)?, ReportKind::ExtraDays)?;
    for series in set.iter() {
        engine.report_non_trading_days(series, &mut sink)?;
    }
    let rows = sink.rows();
    finish_output(sink.finish()?, &path)?;
    info!(list = %list.name, rows, path = %path.display(), "added days report written");

    Ok(JobReport {
        series: set.len(),
        rows,
        output: Some(path),
        ..JobReport::default()
    })
}

fn missing_days(
    list: &ListConfig,
    ctx: &JobContext,
    output_dir: &Path,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<JobReport, RunError> {
    let set = SeriesSet::load(&list.storage)?;
    let engine = ctx.engine();
    let path = output_dir.join(report_file_name(&list.name, "missing_days"));

    let mut sink = CsvReportSink::new(create_output(&path)?, ReportKind::MissingDays)?;
    for series in set.iter() {
        for date in engine.missing_days(series, from, to) {
            sink.emit(&ReportRow {
                symbol: series.symbol().to_string(),
                date,
                values: None,
            })?;
        }
    }
    let rows = sink.rows();
    finish_output(sink.finish()?, &path)?;
    info!(list = %list.name, rows, path = %path.display(), "missing days report written");

    Ok(JobReport {
        series: set.len(),
        rows,
        output: Some(path),
        ..JobReport::default()
    })
}

fn export(
    list: &ListConfig,
    output_dir: &Path,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    append: bool,
) -> Result<JobReport, RunError> {
    let set = SeriesSet::load(&list.storage)?;
    let path = output_dir.join(report_file_name(&list.name, "export"));
    let mut observations = set.observations(from, to);

    if append && path.is_file() {
        let existing = read_feed_file(&path)?;
        observations = merge_export(observations, existing.observations);
    }

    // Staged like the series files: write .tmp, then rename over the old export.
    let tmp = path.with_extension("csv.tmp");
    let written = match write_feed(create_output(&tmp)?, &observations) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
    };
    fs::rename(&tmp, &path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        RunError::Io {
            path: path.clone(),
            source,
        }
    })?;
    info!(list = %list.name, rows = written, path = %path.display(), "export written");

    Ok(JobReport {
        series: set.len(),
        rows: written,
        output: Some(path),
        ..JobReport::default()
    })
}

/// Keep existing export rows the store does not cover; the store wins on overlap.
fn merge_export(stored: Vec<Observation>, existing: Vec<Observation>) -> Vec<Observation> {
    let covered: HashSet<(String, NaiveDate)> = stored
        .iter()
        .map(|o| (o.symbol.to_ascii_uppercase(), o.date))
        .collect();
    let mut merged = stored;
    merged.extend(
        existing
            .into_iter()
            .filter(|o| !covered.contains(&(o.symbol.to_ascii_uppercase(), o.date))),
    );
    merged.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));
    merged
}

fn import(list: &ListConfig, ctx: &JobContext, feed: Option<&Path>) -> Result<JobReport, RunError> {
    let path = feed
        .or(list.updates.as_deref())
        .ok_or_else(|| RunError::NoFeed(list.name.clone()))?;
    let batch = read_feed_file(path)?;

    let mut set = SeriesSet::load(&list.storage)?;
    let stats = set.apply_feed(&ctx.engine(), &batch, FeedMode::Import, SOURCE_IMPORT);
    info!(
        list = %list.name,
        created = stats.created_series,
        inserted = stats.quotes.inserted,
        updated = stats.quotes.updated,
        "feed imported"
    );

    Ok(JobReport {
        series: set.len(),
        rows: stats.quotes.changed(),
        feed: Some(stats),
        persisted: persist_if_dirty(&mut set)?,
        ..JobReport::default()
    })
}

fn period(list: &ListConfig, ctx: &JobContext, days: usize, destination: &Path) -> Result<JobReport, RunError> {
    let set = SeriesSet::load(&list.storage)?;
    let target = destination.join(&list.name);
    let mut aggregated = set.aggregate_period(&ctx.engine(), days, &target)?;
    let rows = aggregated.iter().map(|s| s.len()).sum();
    aggregated.persist()?;
    info!(list = %list.name, days, path = %target.display(), "period list written");

    Ok(JobReport {
        series: aggregated.len(),
        rows,
        persisted: true,
        output: Some(target),
        ..JobReport::default()
    })
}

fn check(list: &ListConfig, ctx: &JobContext, output_dir: &Path) -> Result<JobReport, RunError> {
    let mut set = SeriesSet::load(&list.storage)?;
    let engine = ctx.engine();
    for series in set.iter_mut() {
        engine.tolerance_check(series, ctx.tolerance);
    }

    let findings = set.findings();
    let path = output_dir.join(report_file_name(&list.name, "findings"));
    let mut out = create_output(&path)?;
    write_findings(&mut out, &findings)?;
    finish_output(out, &path)?;
    if !findings.is_empty() {
        warn!(list = %list.name, count = findings.len(), "validation findings");
    }

    Ok(JobReport {
        series: set.len(),
        findings: findings.len(),
        output: Some(path),
        ..JobReport::default()
    })
}

fn update(list: &ListConfig, ctx: &JobContext, feed: Option<&Path>) -> Result<JobReport, RunError> {
    let mut set = SeriesSet::load(&list.storage)?;
    let engine = ctx.engine();
    let mut report = JobReport::default();

    match feed.or(list.updates.as_deref()) {
        Some(path) => {
            let mut batch = read_feed_file(path)?;
            batch
                .observations
                .retain(|o| within(o.date, list.start_date, list.end_date));
            let stats = set.apply_feed(&engine, &batch, FeedMode::Update, SOURCE_FEED);
            report.rows += stats.quotes.changed();
            report.feed = Some(stats);
        }
        None => debug!(list = %list.name, "no update feed"),
    }

    if list.use_corrections {
        if ctx.corrections.is_empty() {
            warn!(list = %list.name, "corrections enabled but none loaded");
        }
        let mut total = CorrectionStats::default();
        for series in set.iter_mut() {
            let stats = engine.apply_corrections(series, &ctx.corrections);
            total.applied += stats.applied;
            total.skipped += stats.skipped;
        }
        report.corrections = Some(total);
    }

    for series in set.iter_mut() {
        engine.tolerance_check(series, ctx.tolerance);
    }
    report.findings = set.findings().len();

    if list.add_extra_day {
        report.rows += set
            .iter_mut()
            .filter_map(|series| engine.add_extra_day(series))
            .count();
    }

    if list.write_audit {
        let written = set.write_audit_trail()?;
        debug!(list = %list.name, written, "audit trail written");
    }

    report.series = set.len();
    report.persisted = persist_if_dirty(&mut set)?;
    Ok(report)
}

// ── Helpers ─────────────────────────────────────────────────────────

fn within(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
}

fn persist_if_dirty(set: &mut SeriesSet) -> Result<bool, RunError> {
    if !set.is_dirty() {
        return Ok(false);
    }
    set.persist()?;
    Ok(true)
}

/// `<list>_<kind>.csv`, with characters unsafe in file names replaced.
pub fn report_file_name(list: &str, kind: &str) -> String {
    let safe: String = list
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') { c } else { '_' })
        .collect();
    format!("{safe}_{kind}.csv")
}

fn create_output(path: &Path) -> Result<BufWriter<File>, RunError> {
    let io_err = |source| RunError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    File::create(path).map(BufWriter::new).map_err(io_err)
}

fn finish_output(mut out: BufWriter<File>, path: &Path) -> Result<(), RunError> {
    out.flush().map_err(|source| RunError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(symbol: &str, date: NaiveDate, close: f32) -> Observation {
        Observation {
            symbol: symbol.into(),
            date,
            values: quotebook_core::Ohlcv::flat(close, 1.0),
        }
    }

    #[test]
    fn report_names_are_file_safe() {
        assert_eq!(report_file_name("asx", "missing_days"), "asx_missing_days.csv");
        assert_eq!(report_file_name("a/b c", "export"), "a_b_c_export.csv");
    }

    #[test]
    fn merge_prefers_stored_values_and_sorts() {
        let stored = vec![obs("BHP", ymd(2014, 5, 12), 11.0)];
        let existing = vec![
            obs("bhp", ymd(2014, 5, 12), 99.0),
            obs("BHP", ymd(2014, 5, 9), 10.0),
            obs("AAA", ymd(2014, 5, 9), 1.0),
        ];
        let merged = merge_export(stored, existing);
        let keys: Vec<_> = merged.iter().map(|o| (o.symbol.as_str(), o.date, o.values.close)).collect();
        assert_eq!(
            keys,
            vec![
                ("AAA", ymd(2014, 5, 9), 1.0),
                ("BHP", ymd(2014, 5, 9), 10.0),
                ("BHP", ymd(2014, 5, 12), 11.0),
            ]
        );
    }

    proptest::proptest! {
        #[test]
        fn merge_keeps_every_stored_row_once(
            stored_days in proptest::collection::btree_set(0i64..60, 0..20),
            existing_days in proptest::collection::btree_set(0i64..60, 0..20),
        ) {
            let base = ymd(2014, 1, 1);
            let stored: Vec<_> = stored_days
                .iter()
                .map(|d| obs("BHP", base + chrono::Duration::days(*d), 1.0))
                .collect();
            let existing: Vec<_> = existing_days
                .iter()
                .map(|d| obs("BHP", base + chrono::Duration::days(*d), 2.0))
                .collect();

            let merged = merge_export(stored.clone(), existing);
            let union: std::collections::BTreeSet<_> = stored_days.union(&existing_days).collect();
            proptest::prop_assert_eq!(merged.len(), union.len());
            proptest::prop_assert!(merged.windows(2).all(|w| w[0].date < w[1].date));
            for o in &stored {
                let hit = merged.iter().find(|m| m.date == o.date).unwrap();
                proptest::prop_assert_eq!(hit.values.close, 1.0);
            }
        }
    }

    #[test]
    fn within_is_inclusive() {
        let d = ymd(2014, 5, 9);
        assert!(within(d, Some(d), Some(d)));
        assert!(within(d, None, None));
        assert!(!within(d, Some(ymd(2014, 5, 10)), None));
    }

    #[test]
    fn job_names_match_subcommands() {
        assert_eq!(Job::Clean.name(), "clean");
        assert_eq!(Job::Update { feed: None }.name(), "update");
        assert_eq!(
            Job::Period {
                days: 5,
                destination: PathBuf::from("x")
            }
            .name(),
            "period"
        );
    }
}
