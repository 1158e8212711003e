//! On-disk contracts: ledger columns, date formats, report file formats.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date format of source prefixes and of the ledger's `source_date` column.
pub const META_DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp format of the ledger's `datetime_of_processing` column.
pub const META_PROCESS_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const META_SOURCE_DATE_COL: &str = "source_date";
pub const META_PROCESS_COL: &str = "datetime_of_processing";

/// Ledger header, in order. Anything else is a corrupt ledger.
pub const META_COLUMNS: [&str; 2] = [META_SOURCE_DATE_COL, META_PROCESS_COL];

/// Cutoff used when every candidate date is already in the ledger.
///
/// No report row can be dated on or after it, so nothing is emitted.
pub fn far_future_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2200, 1, 1).unwrap_or(NaiveDate::MAX)
}

/// Format a calendar date the way source prefixes and the ledger spell it.
pub fn format_date(date: NaiveDate) -> String {
    date.format(META_DATE_FORMAT).to_string()
}

/// Serialization format of a table object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FileFormat {
    /// Row-columnar text with a header row.
    Csv,
    /// Columnar binary.
    Parquet,
}

impl FileFormat {
    /// File extension appended to report keys.
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Returned when a format name is outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported file format '{0}' (expected 'csv' or 'parquet')")]
pub struct UnsupportedFormat(pub String);

impl FromStr for FileFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "parquet" => Ok(FileFormat::Parquet),
            _ => Err(UnsupportedFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for FileFormat {
    type Error = UnsupportedFormat;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileFormat> for String {
    fn from(value: FileFormat) -> Self {
        value.extension().to_string()
    }
}
