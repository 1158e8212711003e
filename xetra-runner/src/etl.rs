//! Report 1 ETL: reconciliation, extraction, transform and load.
//!
//! A run is strictly sequential:
//! 1. Reconcile: read the ledger from the target store and compute the window.
//! 2. Extract: read every source object under each window date's prefix.
//! 3. Transform: aggregate to the daily report, dropping the lookback day.
//! 4. Load: write the report (skipped if empty), then append the newly
//!    covered dates to the ledger.
//!
//! Any failure aborts the run before the ledger is touched, so the ledger
//! never claims a date whose report was not written. Re-running recomputes
//! the same window.

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use xetra_core::clock::Clock;
use xetra_core::config::{ConfigError, SourceConfig, TargetConfig};
use xetra_core::meta::{
    compute_window, load_ledger, update_ledger, ExtractionWindow, LedgerUpdate, MetaError,
};
use xetra_core::schema::format_date;
use xetra_core::store::{read_table, write_table, ObjectStore, StoreError};
use xetra_core::transform::{transform_report1, TransformError};

/// Errors from an ETL run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("ledger error: {0}")]
    Meta(#[from] MetaError),
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("failed to combine source tables: {0}")]
    Concat(#[from] PolarsError),
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub cutoff: NaiveDate,
    /// Dates whose prefixes were read, lookback day included.
    pub extracted_dates: Vec<NaiveDate>,
    pub source_objects: usize,
    pub raw_rows: usize,
    pub report_rows: usize,
    /// Key of the written report, `None` if there was nothing to write.
    pub report_key: Option<String>,
    pub ledger: LedgerUpdate,
}

/// Raw rows plus how many objects they came from.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub frame: DataFrame,
    pub objects: usize,
}

/// The daily report job.
pub struct XetraEtl<'a> {
    source: &'a dyn ObjectStore,
    target: &'a dyn ObjectStore,
    meta_key: String,
    src: SourceConfig,
    trg: TargetConfig,
    clock: &'a dyn Clock,
    window: ExtractionWindow,
}

impl<'a> XetraEtl<'a> {
    /// Validate the configs and reconcile the extraction window against the
    /// ledger stored at `meta_key` in `target`.
    pub fn new(
        source: &'a dyn ObjectStore,
        target: &'a dyn ObjectStore,
        meta_key: impl Into<String>,
        src: SourceConfig,
        trg: TargetConfig,
        clock: &'a dyn Clock,
    ) -> Result<Self, RunError> {
        src.validate()?;
        trg.validate()?;
        let meta_key = meta_key.into();

        let ledger = load_ledger(target, &meta_key)?;
        if ledger.is_none() {
            tracing::info!(%meta_key, "no ledger found, treating as first run");
        }
        let window = compute_window(src.first_extract_date, ledger.as_ref(), clock);
        tracing::info!(
            cutoff = %format_date(window.cutoff),
            dates = window.dates.len(),
            "extraction window reconciled"
        );

        Ok(Self {
            source,
            target,
            meta_key,
            src,
            trg,
            clock,
            window,
        })
    }

    pub fn window(&self) -> &ExtractionWindow {
        &self.window
    }

    /// Dates the ledger gains after a successful run.
    pub fn meta_update_list(&self) -> Vec<NaiveDate> {
        self.window.update_dates()
    }

    /// Report key for a write happening now: `{key}{timestamp}.{ext}`.
    pub fn report_key(&self) -> String {
        format!(
            "{}{}.{}",
            self.trg.key,
            self.clock.now().format(&self.trg.key_date_format),
            self.trg.format.extension()
        )
    }

    /// Read and concatenate every source object in the window.
    ///
    /// No objects (or only empty ones) yields an empty frame.
    pub fn extract(&self) -> Result<Extracted, RunError> {
        tracing::info!("extracting Xetra source files started");

        let mut frames = Vec::new();
        let mut objects = 0usize;
        for prefix in self.window.prefixes() {
            for key in self.source.list(&prefix)? {
                let frame = read_table(self.source, &key)?;
                objects += 1;
                if frame.height() == 0 {
                    tracing::debug!(%key, "skipping empty source object");
                    continue;
                }
                frames.push(frame.lazy());
            }
        }

        let frame = if frames.is_empty() {
            DataFrame::empty()
        } else {
            concat(
                frames,
                UnionArgs {
                    rechunk: true,
                    to_supertypes: true,
                    ..Default::default()
                },
            )?
            .collect()?
        };

        tracing::info!(
            objects,
            rows = frame.height(),
            "finished extracting Xetra source files"
        );
        Ok(Extracted { frame, objects })
    }

    pub fn transform_report1(&self, raw: DataFrame) -> Result<DataFrame, RunError> {
        Ok(transform_report1(raw, &self.src, &self.trg, self.window.cutoff)?)
    }

    /// Write the report, then record the window in the ledger.
    ///
    /// An empty report is not written but the ledger is still updated: the
    /// window's dates were read and had nothing to report.
    pub fn load(&self, report: &DataFrame) -> Result<(Option<String>, LedgerUpdate), RunError> {
        let key = self.report_key();
        let written = write_table(self.target, report, &key, self.trg.format)?;
        let report_key = if written {
            tracing::info!(%key, rows = report.height(), "Xetra target data successfully written");
            Some(key)
        } else {
            None
        };

        let ledger = update_ledger(
            self.target,
            &self.meta_key,
            &self.meta_update_list(),
            self.clock,
        )?;
        tracing::info!(?ledger, "Xetra meta file updated");
        Ok((report_key, ledger))
    }

    /// Extract, transform, load.
    pub fn etl_report1(&self) -> Result<RunSummary, RunError> {
        let extracted = self.extract()?;
        let raw_rows = extracted.frame.height();
        let report = self.transform_report1(extracted.frame)?;
        let (report_key, ledger) = self.load(&report)?;

        Ok(RunSummary {
            cutoff: self.window.cutoff,
            extracted_dates: self.window.dates.clone(),
            source_objects: extracted.objects,
            raw_rows,
            report_rows: report.height(),
            report_key,
            ledger,
        })
    }
}
