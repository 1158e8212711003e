//! Xetra Runner: report run orchestration.
//!
//! This crate builds on `xetra-core` to provide:
//! - The report 1 job (`XetraEtl`): reconcile, extract, transform, load
//! - Run summaries for the CLI
//! - `run_from_config()`, the entry point used by the CLI

pub mod etl;

pub use etl::{Extracted, RunError, RunSummary, XetraEtl};

use xetra_core::clock::Clock;
use xetra_core::config::EtlConfig;

/// Open the configured stores and run report 1 end to end.
pub fn run_from_config(config: &EtlConfig, clock: &dyn Clock) -> Result<RunSummary, RunError> {
    let source = config.storage.source.open();
    let target = config.storage.target.open();
    tracing::info!(
        source = %source.location(),
        target = %target.location(),
        "Xetra ETL job started"
    );

    let etl = XetraEtl::new(
        source.as_ref(),
        target.as_ref(),
        config.meta.key.clone(),
        config.source.clone(),
        config.target.clone(),
        clock,
    )?;
    let summary = etl.etl_report1()?;

    tracing::info!(
        report_rows = summary.report_rows,
        report_key = summary.report_key.as_deref().unwrap_or("-"),
        "Xetra ETL job finished"
    );
    Ok(summary)
}
