//! Quotebook CLI: maintenance jobs over legacy price containers.
//!
//! Every command runs over one or more series sets, given either as
//! `--storage <DIR>` or as lists from a `--config` TOML file:
//! - `update`: apply a feed, corrections, tolerance check, optional extra day
//! - `clean` / `extra-day`: strip non-trading days, pad one day forward
//! - `added-days` / `missing-days` / `check`: CSV reports, storage untouched
//! - `import` / `export`: feed CSV in and out
//! - `period`: aggregate into a new set of N-day quotes

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use quotebook_runner::{
    run_batch, BatchSummary, Job, JobContext, ListConfig, LogProgress, RunnerConfig,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "quotebook",
    about = "Quotebook: maintain legacy binary price series"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// Print the batch summary as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a feed and corrections, tolerance-check, optionally add an extra day, persist.
    #[command(alias = "run")]
    Update {
        #[command(flatten)]
        target: TargetArgs,

        /// Observation feed CSV; overrides each list's `updates`.
        #[arg(long)]
        feed: Option<PathBuf>,

        /// Apply corrections to every selected list.
        #[arg(long, default_value_t = false)]
        use_corrections: bool,

        /// Add an extra day to every selected list.
        #[arg(long, default_value_t = false)]
        extra_day: bool,

        /// Write the audit trail under <storage>/Audit.
        #[arg(long, default_value_t = false)]
        audit: bool,
    },
    /// Remove quotes dated on weekends or non-trading days.
    Clean {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Clone each series' last quote onto the next trading day.
    ExtraDay {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Report quotes dated on weekends or non-trading days without removing them.
    AddedDays {
        #[command(flatten)]
        target: TargetArgs,

        /// Directory for `<list>_added_days.csv`.
        #[arg(long, default_value = "reports")]
        output_dir: PathBuf,
    },
    /// Report trading days with no quote.
    MissingDays {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        range: RangeArgs,

        /// Directory for `<list>_missing_days.csv`.
        #[arg(long, default_value = "reports")]
        output_dir: PathBuf,
    },
    /// Write every quote as a feed CSV.
    Export {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        range: RangeArgs,

        /// Directory for `<list>_export.csv`.
        #[arg(long, default_value = "export")]
        output_dir: PathBuf,

        /// Merge into an existing export instead of replacing it.
        #[arg(long, default_value_t = false)]
        append: bool,
    },
    /// Apply a feed, creating series for symbols not yet stored.
    Import {
        #[command(flatten)]
        target: TargetArgs,

        /// Observation feed CSV; defaults to each list's `updates`.
        #[arg(long)]
        feed: Option<PathBuf>,
    },
    /// Aggregate every series into N-day quotes, written to <destination>/<list>.
    Period {
        #[command(flatten)]
        target: TargetArgs,

        /// Days per period.
        #[arg(long)]
        days: usize,

        #[arg(long)]
        destination: PathBuf,
    },
    /// Validate and tolerance-check; write findings only.
    Check {
        #[command(flatten)]
        target: TargetArgs,

        /// Directory for `<list>_findings.csv`.
        #[arg(long, default_value = "reports")]
        output_dir: PathBuf,
    },
}

/// Which sets to process and the shared inputs.
#[derive(Args)]
struct TargetArgs {
    /// Storage directory holding a catalog (repeatable).
    #[arg(long)]
    storage: Vec<PathBuf>,

    /// TOML list master.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only these lists from the config (repeatable).
    #[arg(long)]
    list: Vec<String>,

    /// Non-trading days CSV.
    #[arg(long)]
    non_trading: Option<PathBuf>,

    /// Zero-based date column in the non-trading days CSV.
    #[arg(long)]
    non_trading_column: Option<usize>,

    /// chrono format of the non-trading dates.
    #[arg(long)]
    non_trading_format: Option<String>,

    /// Corrections CSV.
    #[arg(long)]
    corrections: Option<PathBuf>,

    /// chrono format of the correction dates.
    #[arg(long)]
    corrections_format: Option<String>,

    /// Largest day-over-day fractional change.
    #[arg(long)]
    tolerance: Option<f64>,
}

#[derive(Args)]
struct RangeArgs {
    /// First date (YYYY-MM-DD or YYYYMMDD).
    #[arg(long, value_parser = parse_date)]
    from: Option<NaiveDate>,

    /// Last date, inclusive.
    #[arg(long, value_parser = parse_date)]
    to: Option<NaiveDate>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let (job, target, overrides) = match cli.command {
        Commands::Update {
            target,
            feed,
            use_corrections,
            extra_day,
            audit,
        } => (
            Job::Update { feed },
            target,
            ListOverrides {
                use_corrections,
                add_extra_day: extra_day,
                write_audit: audit,
            },
        ),
        Commands::Clean { target } => (Job::Clean, target, ListOverrides::default()),
        Commands::ExtraDay { target } => (Job::ExtraDay, target, ListOverrides::default()),
        Commands::AddedDays { target, output_dir } => {
            (Job::AddedDays { output_dir }, target, ListOverrides::default())
        }
        Commands::MissingDays {
            target,
            range,
            output_dir,
        } => (
            Job::MissingDays {
                output_dir,
                from: range.from,
                to: range.to,
            },
            target,
            ListOverrides::default(),
        ),
        Commands::Export {
            target,
            range,
            output_dir,
            append,
        } => (
            Job::Export {
                output_dir,
                from: range.from,
                to: range.to,
                append,
            },
            target,
            ListOverrides::default(),
        ),
        Commands::Import { target, feed } => (Job::Import { feed }, target, ListOverrides::default()),
        Commands::Period {
            target,
            days,
            destination,
        } => {
            if days == 0 {
                bail!("--days must be at least 1");
            }
            (Job::Period { days, destination }, target, ListOverrides::default())
        }
        Commands::Check { target, output_dir } => {
            (Job::Check { output_dir }, target, ListOverrides::default())
        }
    };

    let (config, lists) = resolve_target(&target, &overrides)?;
    let ctx = JobContext::from_defaults(&config.defaults)?;
    info!(job = job.name(), lists = lists.len(), "starting batch");
    let summary = run_batch(&job, &lists, &ctx, &LogProgress);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
    } else {
        print_summary(&summary);
    }

    if !summary.all_succeeded() {
        for (list, err) in &summary.errors {
            eprintln!("Error for {list}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

#[derive(Default)]
struct ListOverrides {
    use_corrections: bool,
    add_extra_day: bool,
    write_audit: bool,
}

/// Merge the config file, command-line overrides and `--storage` dirs into one list set.
fn resolve_target(target: &TargetArgs, overrides: &ListOverrides) -> Result<(RunnerConfig, Vec<ListConfig>)> {
    let mut config = match &target.config {
        Some(path) => RunnerConfig::from_file(path)?,
        None => {
            if !target.list.is_empty() {
                bail!("--list needs --config");
            }
            RunnerConfig::default()
        }
    };

    let defaults = &mut config.defaults;
    if let Some(path) = &target.non_trading {
        defaults.non_trading_days = Some(path.clone());
    }
    if let Some(column) = target.non_trading_column {
        defaults.non_trading_date_column = column;
    }
    if let Some(format) = &target.non_trading_format {
        defaults.non_trading_date_format = format.clone();
    }
    if let Some(path) = &target.corrections {
        defaults.corrections = Some(path.clone());
    }
    if let Some(format) = &target.corrections_format {
        defaults.corrections_date_format = format.clone();
    }
    if let Some(tolerance) = target.tolerance {
        if !tolerance.is_finite() || tolerance < 0.0 {
            bail!("--tolerance must be a non-negative number");
        }
        defaults.tolerance = tolerance;
    }

    let mut lists = if target.config.is_some() {
        config.select(&target.list)?
    } else {
        Vec::new()
    };
    lists.extend(target.storage.iter().map(|dir| ListConfig::for_storage(dir.clone())));
    if lists.is_empty() {
        bail!("nothing to do: give --storage <DIR> or --config <FILE>");
    }

    for list in &mut lists {
        list.use_corrections |= overrides.use_corrections;
        list.add_extra_day |= overrides.add_extra_day;
        list.write_audit |= overrides.write_audit;
    }
    Ok((config, lists))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .map_err(|_| format!("invalid date '{raw}', expected YYYY-MM-DD or YYYYMMDD"))
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("=== {} ===", summary.job);
    for (list, report) in &summary.reports {
        let mut line = format!(
            "  {list:<16} series: {:>4}  rows: {:>6}  findings: {:>4}",
            report.series, report.rows, report.findings
        );
        if report.persisted {
            line.push_str("  [saved]");
        }
        if let Some(output) = &report.output {
            line.push_str(&format!("  -> {}", output.display()));
        }
        println!("{line}");
    }
    for (list, err) in &summary.errors {
        println!("  {list:<16} FAILED: {err}");
    }
    println!(
        "  {} of {} succeeded, {} failed",
        summary.succeeded, summary.total, summary.failed
    );
}
