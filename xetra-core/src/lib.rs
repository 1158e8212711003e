//! Xetra Core: ledger reconciliation, daily report aggregation, storage.
//!
//! This crate contains everything a report run needs except sequencing:
//! - Processing ledger and extraction-window reconciliation (`meta`)
//! - Tick-to-daily aggregation with previous-close change (`transform`)
//! - Object-store abstraction with local and in-memory backends (`store`)
//! - CSV / Parquet table codec on top of polars (`store::table`)
//! - TOML job configuration (`config`) and an injectable clock (`clock`)

pub mod clock;
pub mod config;
pub mod meta;
pub mod schema;
pub mod store;
pub mod transform;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EtlConfig, SourceConfig, TargetConfig};
pub use meta::{
    compute_window, load_ledger, update_ledger, ExtractionWindow, Ledger, LedgerEntry,
    LedgerUpdate, MetaError,
};
pub use schema::FileFormat;
pub use store::{ObjectStore, StoreConfig, StoreError};
pub use transform::{transform_report1, TransformError};
