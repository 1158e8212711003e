//! ETL configuration loaded from TOML.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [storage.source]
//! type = "local"
//! root = "data/xetra-source"
//!
//! [storage.target]
//! type = "local"
//! root = "data/xetra-target"
//!
//! [meta]
//! key = "meta_file.csv"
//!
//! [source]
//! first_extract_date = "2021-04-01"
//! columns = ["ISIN", "Mnemonic", "Date", "Time", "StartPrice", "EndPrice", "MinPrice", "MaxPrice", "TradedVolume"]
//! col_date = "Date"
//! col_isin = "ISIN"
//! col_time = "Time"
//! col_start_price = "StartPrice"
//! col_min_price = "MinPrice"
//! col_max_price = "MaxPrice"
//! col_traded_vol = "TradedVolume"
//!
//! [target]
//! col_isin = "isin"
//! col_date = "date"
//! col_op_price = "opening_price_eur"
//! col_clos_price = "closing_price_eur"
//! col_min_price = "minimum_price_eur"
//! col_max_price = "maximum_price_eur"
//! col_daily_traded_vol = "daily_traded_volume"
//! col_change_prev_close = "change_prev_closing_%"
//! key = "report1/xetra_daily_report1_"
//! key_date_format = "%Y%m%d_%H%M%S"
//! format = "parquet"
//! ```

use crate::schema::{FileFormat, UnsupportedFormat};
use crate::store::StoreConfig;
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),
}

/// Which source columns carry which meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Earliest trading date the pipeline is responsible for.
    pub first_extract_date: NaiveDate,
    /// Columns kept from the raw files; everything else is dropped.
    pub columns: Vec<String>,
    pub col_date: String,
    pub col_isin: String,
    pub col_time: String,
    pub col_start_price: String,
    pub col_min_price: String,
    pub col_max_price: String,
    pub col_traded_vol: String,
}

impl SourceConfig {
    fn named_columns(&self) -> [(&'static str, &str); 7] {
        [
            ("col_date", self.col_date.as_str()),
            ("col_isin", self.col_isin.as_str()),
            ("col_time", self.col_time.as_str()),
            ("col_start_price", self.col_start_price.as_str()),
            ("col_min_price", self.col_min_price.as_str()),
            ("col_max_price", self.col_max_price.as_str()),
            ("col_traded_vol", self.col_traded_vol.as_str()),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.columns.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "source.columns contains an empty name".into(),
            ));
        }
        for (field, name) in self.named_columns() {
            require_non_empty("source", field, name)?;
            if !self.columns.iter().any(|c| c == name) {
                return Err(ConfigError::Invalid(format!(
                    "source.{field} = '{name}' is not listed in source.columns"
                )));
            }
        }
        Ok(())
    }
}

/// Report column names and where the report is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub col_isin: String,
    pub col_date: String,
    pub col_op_price: String,
    pub col_clos_price: String,
    pub col_min_price: String,
    pub col_max_price: String,
    pub col_daily_traded_vol: String,
    pub col_change_prev_close: String,
    /// Key prefix of the report object.
    pub key: String,
    /// strftime pattern rendered with the run timestamp and appended to `key`.
    pub key_date_format: String,
    pub format: FileFormat,
}

impl TargetConfig {
    /// Report columns in output order.
    pub fn report_columns(&self) -> [&str; 8] {
        [
            self.col_isin.as_str(),
            self.col_date.as_str(),
            self.col_op_price.as_str(),
            self.col_clos_price.as_str(),
            self.col_min_price.as_str(),
            self.col_max_price.as_str(),
            self.col_daily_traded_vol.as_str(),
            self.col_change_prev_close.as_str(),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("col_isin", &self.col_isin),
            ("col_date", &self.col_date),
            ("col_op_price", &self.col_op_price),
            ("col_clos_price", &self.col_clos_price),
            ("col_min_price", &self.col_min_price),
            ("col_max_price", &self.col_max_price),
            ("col_daily_traded_vol", &self.col_daily_traded_vol),
            ("col_change_prev_close", &self.col_change_prev_close),
            ("key", &self.key),
            ("key_date_format", &self.key_date_format),
        ];
        for (field, value) in names {
            require_non_empty("target", field, value)?;
        }

        let mut seen = HashSet::new();
        for col in self.report_columns() {
            if !seen.insert(col) {
                return Err(ConfigError::Invalid(format!(
                    "target column name '{col}' is used twice"
                )));
            }
        }

        if StrftimeItems::new(&self.key_date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid(format!(
                "target.key_date_format '{}' is not a valid strftime pattern",
                self.key_date_format
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaConfig {
    /// Key of the ledger object in the target store.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub source: StoreConfig,
    pub target: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete ETL job configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub meta: MetaConfig,
    pub source: SourceConfig,
    pub target: TargetConfig,
}

impl EtlConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        // Checked before deserializing so it keeps its own error variant.
        if let Some(format) = table
            .get("target")
            .and_then(|t| t.get("format"))
            .and_then(|v| v.as_str())
        {
            format.parse::<FileFormat>()?;
        }

        let config: EtlConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("meta", "key", &self.meta.key)?;
        self.source.validate()?;
        self.target.validate()
    }
}

fn require_non_empty(section: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "{section}.{field} must not be empty"
        )));
    }
    Ok(())
}
