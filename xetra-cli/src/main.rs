//! Xetra CLI: run the daily report job and inspect its state.
//!
//! Commands:
//! - `run`: reconcile, extract, transform and load report 1
//! - `plan`: show the extraction window the next run would use
//! - `ledger`: summarize the processed-dates ledger

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xetra_core::clock::{Clock, SystemClock};
use xetra_core::config::EtlConfig;
use xetra_core::meta::{compute_window, load_ledger};
use xetra_core::schema::format_date;
use xetra_runner::{run_from_config, RunSummary};

#[derive(Parser)]
#[command(name = "xetra", about = "Xetra CLI: daily trading report ETL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run report 1 end to end.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Print the run summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show which dates the next run would read, without reading them.
    Plan {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Print the window as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Summarize the ledger of processed dates.
    Ledger {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Run { config, .. }
        | Commands::Plan { config, .. }
        | Commands::Ledger { config } => config.clone(),
    };
    let config = load_config(&config_path)?;
    init_logging(&config.logging.level);

    match cli.command {
        Commands::Run { json, .. } => run_report(&config, json),
        Commands::Plan { json, .. } => run_plan(&config, json),
        Commands::Ledger { .. } => run_ledger(&config),
    }
}

fn load_config(path: &Path) -> Result<EtlConfig> {
    Ok(EtlConfig::from_file(path)?)
}

/// Logs go to stderr. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_report(config: &EtlConfig, json: bool) -> Result<()> {
    let summary = run_from_config(config, &SystemClock)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Cutoff:          {}", format_date(summary.cutoff));
    println!("Dates read:      {}", summary.extracted_dates.len());
    println!("Source objects:  {}", summary.source_objects);
    println!("Raw rows:        {}", summary.raw_rows);
    println!("Report rows:     {}", summary.report_rows);
    match &summary.report_key {
        Some(key) => println!("Report:          {key}"),
        None => println!("Report:          (nothing to write)"),
    }
    println!("Ledger:          {:?}", summary.ledger);
}

fn run_plan(config: &EtlConfig, json: bool) -> Result<()> {
    let target = config.storage.target.open();
    let ledger = load_ledger(target.as_ref(), &config.meta.key)?;
    let window = compute_window(config.source.first_extract_date, ledger.as_ref(), &SystemClock);

    if json {
        println!("{}", serde_json::to_string_pretty(&window)?);
        return Ok(());
    }

    if window.is_empty() {
        println!(
            "{}",
            empty_window_message(
                ledger.is_some(),
                config.source.first_extract_date,
                SystemClock.today()
            )
        );
        return Ok(());
    }
    println!("Cutoff:   {}", format_date(window.cutoff));
    println!("Read:     {}", window.prefixes().join(", "));
    let new_dates: Vec<String> = window.update_dates().into_iter().map(format_date).collect();
    println!("Records:  {}", new_dates.join(", "));
    Ok(())
}

/// An empty window means either the ledger is complete or there is nothing
/// to process yet.
fn empty_window_message(has_ledger: bool, first_date: NaiveDate, today: NaiveDate) -> String {
    if has_ledger {
        format!(
            "Nothing to do: every date through {} is in the ledger.",
            format_date(today)
        )
    } else {
        format!(
            "Nothing to do yet: first_extract_date {} is after today ({}).",
            format_date(first_date),
            format_date(today)
        )
    }
}

fn run_ledger(config: &EtlConfig) -> Result<()> {
    let target = config.storage.target.open();
    let Some(ledger) = load_ledger(target.as_ref(), &config.meta.key)? else {
        println!(
            "No ledger at '{}' in {}",
            config.meta.key,
            target.location()
        );
        return Ok(());
    };

    let dates = ledger.processed_dates();
    println!("Ledger:         {} ({})", config.meta.key, target.location());
    println!("Entries:        {}", ledger.len());
    println!("Distinct dates: {}", dates.len());
    if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
        println!("Span:           {} to {}", format_date(*first), format_date(*last));
    }
    if let Some(latest) = ledger.entries.iter().map(|e| e.processed_at).max() {
        println!("Last processed: {latest}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn empty_window_with_ledger_reports_complete() {
        let msg = empty_window_message(true, d("2021-04-01"), d("2021-04-20"));
        assert!(msg.contains("every date through 2021-04-20 is in the ledger"), "{msg}");
    }

    #[test]
    fn empty_window_without_ledger_reports_future_start() {
        let msg = empty_window_message(false, d("2021-05-01"), d("2021-04-20"));
        assert!(!msg.contains("ledger"), "{msg}");
        assert!(msg.contains("2021-05-01"), "{msg}");
    }
}
