//! Processing ledger ("meta file") and extraction-window reconciliation.
//!
//! The ledger is a two-column CSV in the target store recording every source
//! date already turned into report rows:
//!
//! ```text
//! source_date,datetime_of_processing
//! 2021-04-17,2021-04-20 06:00:12
//! ```
//!
//! It is append-only. Duplicate dates are allowed and collapse when read.

use crate::clock::Clock;
use crate::schema::{
    far_future_cutoff, format_date, META_COLUMNS, META_DATE_FORMAT, META_PROCESS_DATE_FORMAT,
};
use crate::store::{ObjectStore, StoreError};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("corrupt ledger '{key}': {reason}")]
    CorruptLedger { key: String, reason: String },

    #[error("ledger storage error: {0}")]
    Store(#[from] StoreError),
}

/// One processed source date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub source_date: NaiveDate,
    pub processed_at: NaiveDateTime,
}

/// All ledger entries in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    pub entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Decode a ledger body. The header must be exactly
    /// `source_date,datetime_of_processing`.
    pub fn parse(key: &str, body: &[u8]) -> Result<Self, MetaError> {
        let corrupt = |reason: String| MetaError::CorruptLedger {
            key: key.to_string(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(body);

        let headers = rdr
            .headers()
            .map_err(|e| corrupt(format!("unreadable header: {e}")))?;
        let found: Vec<&str> = headers.iter().collect();
        if found != META_COLUMNS {
            return Err(corrupt(format!(
                "expected columns {META_COLUMNS:?}, found {found:?}"
            )));
        }

        let mut entries = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| corrupt(format!("row {}: {e}", i + 1)))?;
            let (Some(date), Some(processed)) = (record.get(0), record.get(1)) else {
                return Err(corrupt(format!("row {}: expected 2 fields", i + 1)));
            };
            let source_date = NaiveDate::parse_from_str(date.trim(), META_DATE_FORMAT)
                .map_err(|e| corrupt(format!("row {}: source_date '{date}': {e}", i + 1)))?;
            let processed_at =
                NaiveDateTime::parse_from_str(processed.trim(), META_PROCESS_DATE_FORMAT)
                    .map_err(|e| {
                        corrupt(format!(
                            "row {}: datetime_of_processing '{processed}': {e}",
                            i + 1
                        ))
                    })?;
            entries.push(LedgerEntry {
                source_date,
                processed_at,
            });
        }
        Ok(Self { entries })
    }

    /// Encode as CSV with the fixed header.
    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(META_COLUMNS)?;
        for entry in &self.entries {
            wtr.write_record([
                format_date(entry.source_date),
                entry
                    .processed_at
                    .format(META_PROCESS_DATE_FORMAT)
                    .to_string(),
            ])?;
        }
        wtr.into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }

    /// Distinct processed source dates.
    pub fn processed_dates(&self) -> BTreeSet<NaiveDate> {
        self.entries.iter().map(|e| e.source_date).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read the ledger, or `None` if it doesn't exist yet.
pub fn load_ledger(store: &dyn ObjectStore, key: &str) -> Result<Option<Ledger>, MetaError> {
    match store.get(key) {
        Ok(body) => Ledger::parse(key, &body).map(Some),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Which source dates a run must read, and from which date its output counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionWindow {
    /// Earliest date whose report rows are emitted.
    pub cutoff: NaiveDate,
    /// Every date whose source objects are read, ascending. Starts one day
    /// before `cutoff` so the first emitted date has a previous close.
    pub dates: Vec<NaiveDate>,
}

impl ExtractionWindow {
    /// Dates this run newly covers: the window minus the lookback day.
    pub fn update_dates(&self) -> Vec<NaiveDate> {
        self.dates
            .iter()
            .copied()
            .filter(|d| *d >= self.cutoff)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Dates as source prefixes (`YYYY-MM-DD`).
    pub fn prefixes(&self) -> Vec<String> {
        self.dates.iter().copied().map(format_date).collect()
    }
}

/// Every date from `start` to `end`, inclusive. Empty if `start > end`.
fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .collect()
}

/// Compute the extraction window for a run.
///
/// The candidate range is `first_date - 1` through today. Without a ledger
/// the whole range is read and the cutoff is `first_date`. With one, the
/// window starts the day before the earliest candidate date (lookback day
/// excluded) not yet in the ledger; if there is none, the window is empty
/// and the cutoff is pushed past any real date.
pub fn compute_window(
    first_date: NaiveDate,
    ledger: Option<&Ledger>,
    clock: &dyn Clock,
) -> ExtractionWindow {
    let start = first_date - Duration::days(1);
    let today = clock.today();
    let candidates = date_range(start, today);

    let Some(ledger) = ledger else {
        return ExtractionWindow {
            cutoff: first_date,
            dates: candidates,
        };
    };

    let processed = ledger.processed_dates();
    let min_missing = candidates
        .iter()
        .skip(1)
        .find(|d| !processed.contains(*d))
        .copied();

    match min_missing {
        Some(min_missing) => {
            let lookback = min_missing - Duration::days(1);
            ExtractionWindow {
                cutoff: min_missing,
                dates: candidates.into_iter().filter(|d| *d >= lookback).collect(),
            }
        }
        None => ExtractionWindow {
            cutoff: far_future_cutoff(),
            dates: Vec::new(),
        },
    }
}

/// Outcome of [`update_ledger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerUpdate {
    /// Nothing to record; the ledger was not read or written.
    Skipped,
    /// No ledger existed; one was created.
    Created { appended: usize },
    /// Entries were appended to the existing ledger.
    Appended { appended: usize, total: usize },
}

/// Append `new_dates`, stamped with the current time, to the ledger at `key`.
///
/// An existing ledger with a different header fails with
/// [`MetaError::CorruptLedger`] and nothing is written.
pub fn update_ledger(
    store: &dyn ObjectStore,
    key: &str,
    new_dates: &[NaiveDate],
    clock: &dyn Clock,
) -> Result<LedgerUpdate, MetaError> {
    if new_dates.is_empty() {
        tracing::info!(%key, "no new dates, ledger left untouched");
        return Ok(LedgerUpdate::Skipped);
    }

    // Second precision, matching what the file can hold.
    let now = clock.now();
    let processed_at = now.with_nanosecond(0).unwrap_or(now);
    let new_entries = new_dates.iter().map(|&source_date| LedgerEntry {
        source_date,
        processed_at,
    });

    let (ledger, outcome) = match load_ledger(store, key)? {
        Some(mut ledger) => {
            ledger.entries.extend(new_entries);
            tracing::info!(%key, appended = new_dates.len(), total = ledger.len(), "appending to existing ledger");
            let total = ledger.len();
            (
                ledger,
                LedgerUpdate::Appended {
                    appended: new_dates.len(),
                    total,
                },
            )
        }
        None => {
            tracing::info!(%key, appended = new_dates.len(), "no ledger yet, creating it");
            (
                Ledger {
                    entries: new_entries.collect(),
                },
                LedgerUpdate::Created {
                    appended: new_dates.len(),
                },
            )
        }
    };

    let body = ledger.to_csv().map_err(|e| MetaError::Store(StoreError::Table {
        key: key.to_string(),
        reason: format!("write ledger csv: {e}"),
    }))?;
    store.put(key, &body)?;
    Ok(outcome)
}
