//! Table codec: polars `DataFrame` <-> CSV / Parquet object bodies.

use super::{ObjectStore, StoreError};
use crate::schema::FileFormat;
use polars::prelude::*;
use std::io::Cursor;

fn table_err(key: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Table {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

/// The format implied by a key's extension. Anything that isn't `.parquet` is CSV.
pub fn format_for_key(key: &str) -> FileFormat {
    if key.ends_with(".parquet") {
        FileFormat::Parquet
    } else {
        FileFormat::Csv
    }
}

/// Decode an object body. A zero-length body decodes to an empty frame.
pub fn table_from_bytes(
    key: &str,
    body: Vec<u8>,
    format: FileFormat,
) -> Result<DataFrame, StoreError> {
    if body.is_empty() {
        return Ok(DataFrame::empty());
    }
    match format {
        FileFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(body))
            .finish()
            .map_err(|e| table_err(key, format!("read csv: {e}"))),
        FileFormat::Parquet => ParquetReader::new(Cursor::new(body))
            .finish()
            .map_err(|e| table_err(key, format!("read parquet: {e}"))),
    }
}

/// Encode a frame in the requested format.
pub fn table_to_bytes(
    key: &str,
    df: &DataFrame,
    format: FileFormat,
) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let mut df = df.clone();
    match format {
        FileFormat::Csv => {
            CsvWriter::new(&mut buf)
                .include_header(true)
                .with_separator(b',')
                .finish(&mut df)
                .map_err(|e| table_err(key, format!("write csv: {e}")))?;
        }
        FileFormat::Parquet => {
            ParquetWriter::new(&mut buf)
                .finish(&mut df)
                .map_err(|e| table_err(key, format!("write parquet: {e}")))?;
        }
    }
    Ok(buf)
}

/// Read a table object. Fails with [`StoreError::NotFound`] if the key is absent.
pub fn read_table(store: &dyn ObjectStore, key: &str) -> Result<DataFrame, StoreError> {
    tracing::debug!(location = %store.location(), %key, "reading table");
    let body = store.get(key)?;
    table_from_bytes(key, body, format_for_key(key))
}

/// Write a table object, overwriting any existing one.
///
/// Returns `false` without touching the store when `df` has no rows.
pub fn write_table(
    store: &dyn ObjectStore,
    df: &DataFrame,
    key: &str,
    format: FileFormat,
) -> Result<bool, StoreError> {
    if df.height() == 0 {
        tracing::info!(%key, "table is empty, nothing written");
        return Ok(false);
    }
    let body = table_to_bytes(key, df, format)?;
    store.put(key, &body)?;
    Ok(true)
}
