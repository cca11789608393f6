//! Integration tests for runner jobs against real storage directories.
//!
//! Tests:
//! 1. update applies a feed, corrections and an extra day, then persists
//! 2. clean strips weekend quotes and persists; a second run changes nothing
//! 3. missing-days and added-days write their CSV reports
//! 4. import creates series; export writes and appends
//! 5. period writes a new set under the destination
//! 6. check writes findings without touching storage
//! 7. a config-driven batch isolates a broken set

use chrono::NaiveDate;
use quotebook_core::data::{read_feed_file, AUDIT_DIR};
use quotebook_core::{
    Correction, CorrectionKind, NonTradingDays, Ohlcv, QuoteSeries, SeriesSet, TimeFrame,
};
use quotebook_runner::{
    report_file_name, run_batch, Job, JobContext, ListConfig, RunnerConfig, SilentProgress,
};
use std::fs;
use std::path::Path;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Persist a set with one series per symbol, one quote per (day, close).
fn seed_set(dir: &Path, symbols: &[&str], days: &[(NaiveDate, f32)]) {
    let calendar = NonTradingDays::new();
    let engine = quotebook_core::ReconciliationEngine::new(&calendar);
    let mut set = SeriesSet::new(dir);
    for symbol in symbols {
        let series = set.add_series(QuoteSeries::new(*symbol, *symbol, TimeFrame::Daily)).unwrap();
        for &(date, close) in days {
            engine.upsert_observation(series, date, Ohlcv::flat(close, 100.0), "Seed");
        }
    }
    set.persist().unwrap();
}

fn week_of_may_2014() -> Vec<(NaiveDate, f32)> {
    vec![
        (ymd(2014, 5, 5), 10.0),
        (ymd(2014, 5, 6), 10.1),
        (ymd(2014, 5, 7), 10.2),
        (ymd(2014, 5, 8), 10.3),
        (ymd(2014, 5, 9), 10.4),
    ]
}

fn list(dir: &Path, name: &str) -> ListConfig {
    let mut list = ListConfig::for_storage(dir.join(name));
    list.name = name.to_string();
    list
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
}

// ──────────────────────────────────────────────
// Jobs
// ──────────────────────────────────────────────

#[test]
fn update_runs_the_full_cycle() {
    let root = tempfile::tempdir().unwrap();
    let mut asx = list(root.path(), "asx");
    seed_set(&asx.storage, &["BHP"], &week_of_may_2014());

    let feed = root.path().join("feed.csv");
    fs::write(
        &feed,
        "Symbol,Date,Open,High,Low,Close,Volume\n\
         BHP,20140512,10.5,10.5,10.5,10.5,200\n\
         BHP,20140510,1,1,1,1,1\n\
         ZZZ,20140512,1,1,1,1,1\n",
    )
    .unwrap();
    asx.updates = Some(feed);
    asx.use_corrections = true;
    asx.add_extra_day = true;
    asx.write_audit = true;

    let ctx = JobContext::new(NonTradingDays::new(), 0.5).with_corrections(vec![Correction {
        symbol: "BHP".into(),
        date: ymd(2014, 5, 6),
        kind: CorrectionKind::RemoveDate,
        values: Ohlcv::default(),
    }]);

    let report = Job::Update { feed: None }.run(&asx, &ctx).unwrap();
    assert!(report.persisted);
    let feed_stats = report.feed.unwrap();
    assert_eq!(feed_stats.quotes.inserted, 1);
    assert_eq!(feed_stats.quotes.rejected, 1);
    assert_eq!(feed_stats.unknown_symbols, 1);
    assert_eq!(report.corrections.unwrap().applied, 1);

    let set = SeriesSet::load(&asx.storage).unwrap();
    let bhp = set.series("BHP").unwrap();
    assert!(!bhp.contains(ymd(2014, 5, 6)));
    assert!(!bhp.contains(ymd(2014, 5, 10)));
    assert_eq!(bhp.quote(ymd(2014, 5, 12)).unwrap().values().close, 10.5);
    assert_eq!(bhp.quote(ymd(2014, 5, 13)).unwrap().values().close, 10.5);
    assert_eq!(bhp.last_observed(), Some(ymd(2014, 5, 13)));
    assert!(asx.storage.join(AUDIT_DIR).join("BHP.csv").is_file());
}

#[test]
fn clean_persists_only_when_something_was_removed() {
    let root = tempfile::tempdir().unwrap();
    let asx = list(root.path(), "asx");
    let mut days = week_of_may_2014();
    days.push((ymd(2014, 5, 10), 10.5));

    // Stored quotes are trusted, so a weekend quote can come back from disk.
    let mut set = SeriesSet::new(&asx.storage);
    let series = set.add_series(QuoteSeries::new("BHP", "BHP", TimeFrame::Daily)).unwrap();
    for (date, close) in days {
        series.add_quote(quotebook_core::Quote::stored(date, Ohlcv::flat(close, 1.0)));
    }
    set.persist().unwrap();

    let ctx = JobContext::default();
    let first = Job::Clean.run(&asx, &ctx).unwrap();
    assert_eq!(first.rows, 1);
    assert!(first.persisted);

    let second = Job::Clean.run(&asx, &ctx).unwrap();
    assert_eq!(second.rows, 0);
    assert!(!second.persisted);
    assert_eq!(SeriesSet::load(&asx.storage).unwrap().series("BHP").unwrap().len(), 5);
}

#[test]
fn reports_are_written_per_list() {
    let root = tempfile::tempdir().unwrap();
    let asx = list(root.path(), "asx");
    let mut set = SeriesSet::new(&asx.storage);
    let series = set.add_series(QuoteSeries::new("BHP", "BHP", TimeFrame::Daily)).unwrap();
    for date in [ymd(2014, 5, 5), ymd(2014, 5, 7), ymd(2014, 5, 10)] {
        series.add_quote(quotebook_core::Quote::stored(date, Ohlcv::flat(10.0, 100.0)));
    }
    set.persist().unwrap();

    let out = root.path().join("reports");
    let ctx = JobContext::default();

    let missing = Job::MissingDays {
        output_dir: out.clone(),
        from: None,
        to: None,
    }
    .run(&asx, &ctx)
    .unwrap();
    assert_eq!(missing.output, Some(out.join(report_file_name("asx", "missing_days"))));
    assert_eq!(
        read_lines(&missing.output.unwrap()),
        vec!["Symbol,Date", "BHP,20140506", "BHP,20140508", "BHP,20140509"]
    );

    let added = Job::AddedDays { output_dir: out.clone() }.run(&asx, &ctx).unwrap();
    assert_eq!(added.rows, 1);
    assert_eq!(
        read_lines(&added.output.unwrap()),
        vec!["Symbol,Date,Open,High,Low,Close,Volume", "BHP,20140510,10,10,10,10,100"]
    );
    // report-only: the weekend quote is still stored
    assert_eq!(SeriesSet::load(&asx.storage).unwrap().series("BHP").unwrap().len(), 3);
}

#[test]
fn import_then_export_and_append() {
    let root = tempfile::tempdir().unwrap();
    let fresh = list(root.path(), "fresh");
    let feed = root.path().join("import.csv");
    fs::write(
        &feed,
        "Symbol,Date,Open,High,Low,Close,Volume\n\
         CBA,20140509,70,71,69,70.5,1000\n\
         BHP,20140509,35,36,34,35.5,2000\n\
         BHP,not-a-date,1,1,1,1,1\n",
    )
    .unwrap();

    let ctx = JobContext::default();
    let imported = Job::Import { feed: Some(feed) }.run(&fresh, &ctx).unwrap();
    assert_eq!(imported.feed.as_ref().unwrap().created_series, 2);
    assert!(imported.persisted);

    let set = SeriesSet::load(&fresh.storage).unwrap();
    assert_eq!(set.symbols().collect::<Vec<_>>(), vec!["CBA", "BHP"]);

    let out = root.path().join("export");
    let exported = Job::Export {
        output_dir: out.clone(),
        from: None,
        to: None,
        append: false,
    }
    .run(&fresh, &ctx)
    .unwrap();
    let path = exported.output.unwrap();
    let batch = read_feed_file(&path).unwrap();
    assert_eq!(batch.observations.len(), 2);
    assert_eq!(batch.observations[0].symbol, "BHP");

    // An older row for another day survives an append; the stored day is refreshed.
    fs::write(
        &path,
        "Symbol,Date,Open,High,Low,Close,Volume\n\
         BHP,20140508,1,1,1,1,1\n\
         BHP,20140509,9,9,9,9,9\n",
    )
    .unwrap();
    let appended = Job::Export {
        output_dir: out,
        from: None,
        to: None,
        append: true,
    }
    .run(&fresh, &ctx)
    .unwrap();
    assert_eq!(appended.rows, 3);
    let rows = read_feed_file(&path).unwrap().observations;
    assert_eq!(rows[0].date, ymd(2014, 5, 8));
    assert_eq!(rows[1].values.close, 35.5);
    assert_eq!(rows[2].symbol, "CBA");
    assert!(!path.with_extension("csv.tmp").exists());
}

#[test]
fn import_without_feed_fails() {
    let root = tempfile::tempdir().unwrap();
    let err = Job::Import { feed: None }
        .run(&list(root.path(), "x"), &JobContext::default())
        .unwrap_err();
    assert!(err.to_string().contains("no observation feed"));
}

#[test]
fn period_writes_a_new_set() {
    let root = tempfile::tempdir().unwrap();
    let asx = list(root.path(), "asx");
    seed_set(&asx.storage, &["BHP", "CBA"], &week_of_may_2014());

    let destination = root.path().join("weekly");
    let report = Job::Period {
        days: 5,
        destination: destination.clone(),
    }
    .run(&asx, &JobContext::default())
    .unwrap();
    assert_eq!(report.output, Some(destination.join("asx")));

    let weekly = SeriesSet::load(destination.join("asx")).unwrap();
    let bhp = weekly.series("BHP").unwrap();
    assert_eq!(bhp.len(), 1);
    let q = bhp.quote(ymd(2014, 5, 9)).unwrap().values();
    assert_eq!(q.open, 10.0);
    assert_eq!(q.close, 10.4);
    assert_eq!(q.high, 10.4);
    assert_eq!(q.volume, 500.0);

    let too_long = Job::Period {
        days: 6,
        destination,
    }
    .run(&asx, &JobContext::default());
    assert!(too_long.is_err());
}

#[test]
fn check_reports_findings_without_persisting() {
    let root = tempfile::tempdir().unwrap();
    let asx = list(root.path(), "asx");
    seed_set(
        &asx.storage,
        &["BHP"],
        &[(ymd(2014, 5, 8), 10.0), (ymd(2014, 5, 9), 20.0)],
    );
    let before = fs::read(asx.storage.join("F1.DAT")).unwrap();

    let out = root.path().join("reports");
    let report = Job::Check { output_dir: out }
        .run(&asx, &JobContext::new(NonTradingDays::new(), 0.5))
        .unwrap();
    assert_eq!(report.findings, 1);
    assert!(!report.persisted);
    // every field doubled; low is checked last and wins
    assert_eq!(
        read_lines(&report.output.unwrap())[1],
        "BHP,20140509,LowValueOutOfTolerance"
    );
    assert_eq!(fs::read(asx.storage.join("F1.DAT")).unwrap(), before);
}

// ──────────────────────────────────────────────
// Batch
// ──────────────────────────────────────────────

#[test]
fn config_batch_isolates_failures() {
    let root = tempfile::tempdir().unwrap();
    seed_set(&root.path().join("good"), &["BHP"], &week_of_may_2014());
    let broken = root.path().join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("EMASTER"), [0u8; 10]).unwrap();

    let config_path = root.path().join("quotebook.toml");
    fs::write(
        &config_path,
        r#"
[defaults]
tolerance = 0.5

[[lists]]
name = "broken"
storage = "broken"

[[lists]]
name = "good"
storage = "good"
add_extra_day = true
"#,
    )
    .unwrap();

    let config = RunnerConfig::from_file(&config_path).unwrap();
    let ctx = JobContext::from_defaults(&config.defaults).unwrap();
    let summary = run_batch(&Job::Update { feed: None }, &config.lists, &ctx, &SilentProgress);

    assert_eq!(summary.total, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors[0].0, "broken");
    assert_eq!(summary.reports[0].0, "good");
    assert!(summary.reports[0].1.persisted);

    let good = SeriesSet::load(root.path().join("good")).unwrap();
    assert!(good.series("BHP").unwrap().contains(ymd(2014, 5, 12)));
}

#[test]
fn missing_corrections_file_fails_context() {
    let root = tempfile::tempdir().unwrap();
    let config = RunnerConfig::from_toml(&format!(
        "[defaults]\ncorrections = {:?}\n",
        root.path().join("none.csv").display().to_string()
    ))
    .unwrap();
    assert!(JobContext::from_defaults(&config.defaults).is_err());
}
