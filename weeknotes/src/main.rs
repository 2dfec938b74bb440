//! weeknotes - incremental note summaries rolled up into a weekly report
//!
//! Uses XDG Base Directory specification for file locations:
//! - Summary log: $XDG_DATA_HOME/weeknotes/summaries.jsonl
//! - Watermark: $XDG_DATA_HOME/weeknotes/state.json
//! - Reports: $XDG_DATA_HOME/weeknotes/reports/ (or `report.output_dir`)
//! - Logs: $XDG_STATE_HOME/weeknotes/weeknotes.log
//! - Config: $XDG_CONFIG_HOME/weeknotes/config.toml

mod process_lock;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use process_lock::acquire_run_lock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weeknotes_core::aggregate::{build_report, FolderClusterer, ReportOutcome, TopicClusterer};
use weeknotes_core::ingest::{FsVault, ScanCoordinator, ScanOptions, ScanResult};
use weeknotes_core::llm::{create_client, LlmClusterer, LlmSummarizer};
use weeknotes_core::publish::{create_tracker, publish};
use weeknotes_core::store::{ReportStore, RunState, SummaryLog};
use weeknotes_core::summarize::{OutlineSummarizer, Summarizer};
use weeknotes_core::{Config, Error, Period, Report};

#[derive(Parser)]
#[command(name = "weeknotes")]
#[command(about = "Summarize changed notes and roll them up into a weekly report")]
#[command(version)]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/weeknotes/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vault directory (overrides `vault.path`)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Verbose output (-v lists per-note details)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize notes whose content changed since the last scan
    Scan {
        /// Ignore the stored watermark and look back this many days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Build the report for a period
    Report {
        #[command(flatten)]
        period: PeriodArgs,

        /// Rebuild even if the stored report matches the log
        #[arg(long)]
        regenerate: bool,

        /// Publish the report after building it
        #[arg(long)]
        publish: bool,
    },
    /// Publish the stored report for a period
    Publish {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Scan, then build (and optionally publish) the current period's report
    Run {
        /// Ignore the stored watermark and look back this many days
        #[arg(long)]
        days: Option<u32>,

        /// Rebuild even if the stored report matches the log
        #[arg(long)]
        regenerate: bool,

        /// Publish the report after building it
        #[arg(long)]
        publish: bool,
    },
    /// List recently modified notes without summarizing anything
    Preview {
        /// Days to look back (defaults to `report.period_days`)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Show summary log and watermark status
    Status,
}

#[derive(clap::Args, Debug)]
struct PeriodArgs {
    /// First day of the period (YYYY-MM-DD, UTC)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Day after the last day of the period (YYYY-MM-DD, UTC, exclusive)
    #[arg(long)]
    to: Option<NaiveDate>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let _log_guard =
        weeknotes_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(command = ?args.command, "weeknotes starting");

    let log_path = Config::summary_log_path();
    let now = Utc::now();

    match &args.command {
        Command::Scan { days } => {
            let _lock = acquire_run_lock(&log_path).context("failed to acquire run lock")?;
            let result = run_scan(&config, &args, &log_path, *days)?;
            if result.cancelled {
                return Err(Error::Cancelled.into());
            }
        }
        Command::Report {
            period,
            regenerate,
            publish,
        } => {
            let period = resolve_period(period, config.report.period_days, now)?;
            let outcome = {
                let _lock = acquire_run_lock(&log_path).context("failed to acquire run lock")?;
                run_report(&config, &log_path, &period, *regenerate, now)?
            };
            if *publish {
                run_publish(&config, &outcome.report)?;
            }
        }
        Command::Publish { period } => {
            let period = resolve_period(period, config.report.period_days, now)?;
            let store = ReportStore::new(config.report_dir());
            let report = store
                .load(&period)
                .context("failed to read stored report")?
                .with_context(|| {
                    format!("no stored report for {period}; run `weeknotes report` first")
                })?;
            run_publish(&config, &report)?;
        }
        Command::Run {
            days,
            regenerate,
            publish,
        } => {
            let period = resolve_period(
                &PeriodArgs {
                    from: None,
                    to: None,
                },
                config.report.period_days,
                now,
            )?;
            let outcome = {
                let _lock = acquire_run_lock(&log_path).context("failed to acquire run lock")?;
                let result = run_scan(&config, &args, &log_path, *days)?;
                if result.cancelled {
                    return Err(Error::Cancelled.into());
                }
                run_report(&config, &log_path, &period, *regenerate, Utc::now())?
            };
            if *publish {
                run_publish(&config, &outcome.report)?;
            }
        }
        Command::Preview { days } => {
            let days = days.unwrap_or(config.report.period_days);
            run_preview(&config, &args, days, now)?;
        }
        Command::Status => print_status(&log_path)?,
    }

    tracing::info!("weeknotes complete");
    Ok(())
}

/// Run the scan stage with a progress bar and Ctrl+C cancellation.
fn run_scan(config: &Config, args: &Args, log_path: &Path, days: Option<u32>) -> Result<ScanResult> {
    let mut log = SummaryLog::open(log_path)
        .with_context(|| format!("failed to open summary log {}", log_path.display()))?;

    let coordinator = ScanCoordinator::new(
        Box::new(open_vault(config, args)?),
        summarizer_for(config)?,
        config.summarizer.clone(),
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nStopping after the current note...");
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let options = ScanOptions {
        lookback: days.map(|d| Duration::days(i64::from(d))),
        cancel: Some(cancel),
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let state_path = RunState::path_for(log_path);
    let result = coordinator
        .scan_with_progress(&mut log, &state_path, &options, |current, total, identity| {
            if current == 0 {
                pb.set_length(total as u64);
            }
            pb.set_position(current as u64);
            pb.set_message(identity.to_string());
        })
        .context("scan failed")?;

    pb.finish_and_clear();
    print_scan_result(&result, args.verbose);
    Ok(result)
}

/// Build (or reuse) the report for `period`.
fn run_report(
    config: &Config,
    log_path: &Path,
    period: &Period,
    regenerate: bool,
    now: DateTime<Utc>,
) -> Result<ReportOutcome> {
    let log = SummaryLog::open_read_only(log_path)
        .with_context(|| format!("failed to open summary log {}", log_path.display()))?;
    let clusterer = clusterer_for(config)?;
    let store = ReportStore::new(config.report_dir());

    let outcome = build_report(
        &log,
        period,
        clusterer.as_ref(),
        &config.summarizer,
        &store,
        regenerate,
        now,
    )
    .context("report failed")?;

    println!("\nReport for {}:", period);
    println!("  Summaries: {}", outcome.report.record_count);
    println!("  Topics:    {}", outcome.report.topics.len());
    if outcome.reused {
        println!("  Unchanged since last build: {}", outcome.path.display());
    } else {
        println!("  Written:   {}", outcome.path.display());
    }
    Ok(outcome)
}

fn run_publish(config: &Config, report: &Report) -> Result<()> {
    if !config.publish.is_ready() {
        anyhow::bail!("publishing needs publish.api_key in the config or LINEAR_API_KEY");
    }
    let tracker = create_tracker(&config.publish).context("failed to create tracker client")?;
    let key = report.idempotency_key();
    let issue = publish(report, &key, tracker.as_ref()).context("publish failed")?;

    match &issue.url {
        Some(url) => println!("Published {} ({})", issue.id, url),
        None => println!("Published {}", issue.id),
    }
    tracing::info!(issue = %issue.id, key = %key, "Report published");
    Ok(())
}

fn run_preview(config: &Config, args: &Args, days: u32, now: DateTime<Utc>) -> Result<()> {
    let vault = open_vault(config, args)?;
    let since = now
        .checked_sub_signed(Duration::days(i64::from(days)))
        .with_context(|| format!("--days {days} is out of range"))?;
    let entries = weeknotes_core::preview::preview(&vault, since).context("preview failed")?;

    println!("Vault: {}", vault.root().display());
    println!(
        "Found {} modified note(s) in the last {} day(s).",
        entries.len(),
        days
    );
    for entry in &entries {
        println!();
        print!("{}", entry.render());
    }
    Ok(())
}

fn print_status(log_path: &Path) -> Result<()> {
    let log = SummaryLog::open_read_only(log_path)
        .with_context(|| format!("failed to open summary log {}", log_path.display()))?;
    let state = RunState::load(&RunState::path_for(log_path)).context("failed to read run state")?;

    println!("Summary log: {}", log_path.display());
    println!("  Records:   {}", log.len());
    match state.watermark {
        Some(watermark) => println!("  Watermark: {}", watermark.to_rfc3339()),
        None => println!("  Watermark: none (next scan reads the whole vault)"),
    }
    if let Some(last) = log.records().last() {
        println!(
            "  Latest:    {} ({})",
            last.identity,
            last.created_at.to_rfc3339()
        );
    }
    Ok(())
}

fn print_scan_result(result: &ScanResult, verbose: u8) {
    println!("\nScan complete:");
    println!("  Changed notes:   {}", result.documents_changed);
    println!("  Unchanged notes: {}", result.documents_unchanged);
    println!("  Summaries added: {}", result.records_appended);
    if result.duplicates_skipped > 0 {
        println!("  Already logged:  {}", result.duplicates_skipped);
    }
    if let Some(watermark) = result.watermark {
        println!("  Watermark:       {}", watermark.to_rfc3339());
    }

    if result.cancelled {
        println!(
            "\nCancelled with {} note(s) left for the next run.",
            result.documents_pending
        );
    }

    if !result.failures.is_empty() {
        println!("\nFailed ({}), will retry next run:", result.failures.len());
        for failure in &result.failures {
            println!("  {}: {}", failure.identity, failure.error);
        }
    }

    if !result.unreadable.is_empty() {
        println!("\nUnreadable ({}):", result.unreadable.len());
        for unreadable in &result.unreadable {
            println!("  {}: {}", unreadable.identity, unreadable.reason);
        }
    }

    if verbose >= 1 && result.documents_unchanged > 0 {
        println!(
            "\n{} note(s) were touched without content changes.",
            result.documents_unchanged
        );
    }
}

fn open_vault(config: &Config, args: &Args) -> Result<FsVault> {
    let root = args
        .vault
        .clone()
        .or_else(|| config.vault.path.clone())
        .context("no vault configured; pass --vault or set vault.path")?;
    Ok(FsVault::new(root, &config.vault).exclude(config.report_dir()))
}

fn summarizer_for(config: &Config) -> Result<Box<dyn Summarizer>> {
    match &config.llm {
        Some(llm) => {
            let client = create_client(llm).context("failed to create LLM client")?;
            Ok(Box::new(LlmSummarizer::new(client)))
        }
        None => {
            tracing::info!("No [llm] configured, using the outline summarizer");
            Ok(Box::new(OutlineSummarizer::new()))
        }
    }
}

fn clusterer_for(config: &Config) -> Result<Box<dyn TopicClusterer>> {
    match &config.llm {
        Some(llm) => {
            let client = create_client(llm).context("failed to create LLM client")?;
            Ok(Box::new(LlmClusterer::new(
                client,
                config.summarizer.max_batch_chars,
            )))
        }
        None => Ok(Box::new(FolderClusterer::new())),
    }
}

/// Period from CLI dates; defaults to the `days` ending at the next UTC midnight.
fn resolve_period(args: &PeriodArgs, days: u32, now: DateTime<Utc>) -> Result<Period> {
    let end = match args.to {
        Some(date) => midnight(date),
        None => midnight(now.date_naive()) + Duration::days(1),
    };
    let start = match args.from {
        Some(date) => midnight(date),
        None => end
            .checked_sub_signed(Duration::days(i64::from(days)))
            .with_context(|| format!("a {days}-day period is out of range"))?,
    };
    Ok(Period::new(start, end)?)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_period_is_stable_within_a_day() {
        let args = PeriodArgs {
            from: None,
            to: None,
        };
        let morning = Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2026, 10, 16, 22, 30, 0).unwrap();

        let a = resolve_period(&args, 7, morning).unwrap();
        let b = resolve_period(&args, 7, evening).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.end, midnight(date(2026, 10, 17)));
        assert_eq!(a.start, midnight(date(2026, 10, 10)));
    }

    #[test]
    fn test_explicit_dates_are_end_exclusive() {
        let args = PeriodArgs {
            from: Some(date(2026, 10, 5)),
            to: Some(date(2026, 10, 12)),
        };
        let period = resolve_period(&args, 7, Utc::now()).unwrap();
        assert_eq!(period.start, midnight(date(2026, 10, 5)));
        assert_eq!(period.end, midnight(date(2026, 10, 12)));

        let reversed = PeriodArgs {
            from: Some(date(2026, 10, 12)),
            to: Some(date(2026, 10, 5)),
        };
        assert!(resolve_period(&reversed, 7, Utc::now()).is_err());
    }

    #[test]
    fn test_huge_period_is_an_error_not_a_panic() {
        let args = PeriodArgs {
            from: None,
            to: None,
        };
        let err = resolve_period(&args, u32::MAX, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
