//! Daily report aggregation ("report 1").
//!
//! Tick rows in, one row per (instrument, date) out:
//!
//! | column            | value                                                  |
//! |-------------------|--------------------------------------------------------|
//! | opening price     | start price of the earliest row by time                |
//! | closing price     | start price of the latest row by time                  |
//! | minimum price     | min of the min-price column                            |
//! | maximum price     | max of the max-price column                            |
//! | traded volume     | sum of the traded-volume column                        |
//! | change prev close | % change of closing price vs the instrument's previous |
//! |                   | date in the input; null for its first date             |
//!
//! The closing price is read from the start-price column, not an end-price
//! column. Downstream consumers depend on that definition.

use crate::config::{SourceConfig, TargetConfig};
use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use crate::schema::format_date;

const PREV_CLOSE_COL: &str = "prev_closing_price";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("source data is missing column '{0}'")]
    MissingColumn(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Round to two decimals, ties to even on the scaled value.
fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

/// Round every Float64 column of `df` to two decimals.
fn round_float_columns(mut df: DataFrame) -> Result<DataFrame, TransformError> {
    let float_cols: Vec<PlSmallStr> = df
        .get_columns()
        .iter()
        .filter(|c| matches!(c.dtype(), DataType::Float64))
        .map(|c| c.name().clone())
        .collect();

    for name in float_cols {
        let rounded: Float64Chunked = df
            .column(name.as_str())?
            .f64()?
            .into_iter()
            .map(|v| v.map(round2))
            .collect();
        df.with_column(rounded.into_series().with_name(name))?;
    }
    Ok(df)
}

/// Build the daily report from raw tick rows.
///
/// Rows dated before `cutoff` are used for the previous-close lookback but
/// not emitted. Empty input returns an empty frame.
pub fn transform_report1(
    raw: DataFrame,
    src: &SourceConfig,
    trg: &TargetConfig,
    cutoff: NaiveDate,
) -> Result<DataFrame, TransformError> {
    if raw.height() == 0 {
        tracing::info!("the source frame is empty, no transformation applied");
        return Ok(DataFrame::empty());
    }

    tracing::info!(rows = raw.height(), "applying report 1 transformations");

    for name in &src.columns {
        if raw.column(name).is_err() {
            return Err(TransformError::MissingColumn(name.clone()));
        }
    }

    let isin = src.col_isin.as_str();
    let date = src.col_date.as_str();
    let group_keys = [col(isin), col(date)];

    // Project and normalize types. Dates and times stay text: both are
    // zero-padded, so lexical order is chronological order.
    let projected: Vec<Expr> = src
        .columns
        .iter()
        .map(|name| {
            if name == date || name == &src.col_time {
                col(name.as_str()).cast(DataType::String)
            } else if name == &src.col_start_price
                || name == &src.col_min_price
                || name == &src.col_max_price
            {
                col(name.as_str()).cast(DataType::Float64)
            } else if name == &src.col_traded_vol {
                // A batch with an all-empty volume column decodes as text and
                // drags the unioned column to text with it.
                col(name.as_str())
                    .cast(DataType::Float64)
                    .cast(DataType::Int64)
            } else {
                col(name.as_str())
            }
        })
        .collect();

    let no_nulls = src
        .columns
        .iter()
        .map(|name| col(name.as_str()).is_not_null())
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true));

    let by_time = SortMultipleOptions::default().with_maintain_order(true);
    let start_price_by_time = || {
        col(src.col_start_price.as_str()).sort_by([col(src.col_time.as_str())], by_time.clone())
    };

    let daily = raw
        .lazy()
        .select(projected)
        .filter(no_nulls)
        .with_columns([
            start_price_by_time()
                .first()
                .over(group_keys.clone())
                .alias(trg.col_op_price.as_str()),
            start_price_by_time()
                .last()
                .over(group_keys.clone())
                .alias(trg.col_clos_price.as_str()),
        ])
        .group_by(group_keys.clone())
        .agg([
            col(trg.col_op_price.as_str()).min(),
            col(trg.col_clos_price.as_str()).min(),
            col(src.col_min_price.as_str())
                .min()
                .alias(trg.col_min_price.as_str()),
            col(src.col_max_price.as_str())
                .max()
                .alias(trg.col_max_price.as_str()),
            col(src.col_traded_vol.as_str())
                .sum()
                .alias(trg.col_daily_traded_vol.as_str()),
        ])
        .sort_by_exprs(group_keys.clone(), SortMultipleOptions::default())
        .with_column(
            col(trg.col_clos_price.as_str())
                .shift(lit(1))
                .over([col(isin)])
                .alias(PREV_CLOSE_COL),
        )
        .with_column(
            ((col(trg.col_clos_price.as_str()) - col(PREV_CLOSE_COL)) / col(PREV_CLOSE_COL)
                * lit(100.0))
            .alias(trg.col_change_prev_close.as_str()),
        )
        .filter(col(date).gt_eq(lit(format_date(cutoff))))
        .select([
            col(isin).alias(trg.col_isin.as_str()),
            col(date).alias(trg.col_date.as_str()),
            col(trg.col_op_price.as_str()),
            col(trg.col_clos_price.as_str()),
            col(trg.col_min_price.as_str()),
            col(trg.col_max_price.as_str()),
            col(trg.col_daily_traded_vol.as_str()),
            col(trg.col_change_prev_close.as_str()),
        ])
        .collect()?;

    let report = round_float_columns(daily)?;
    tracing::info!(rows = report.height(), "report 1 transformations finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FileFormat;

    fn source_config() -> SourceConfig {
        SourceConfig {
            first_extract_date: NaiveDate::from_ymd_opt(2021, 4, 1).unwrap(),
            columns: [
                "ISIN",
                "Mnemonic",
                "Date",
                "Time",
                "StartPrice",
                "EndPrice",
                "MinPrice",
                "MaxPrice",
                "TradedVolume",
            ]
            .map(String::from)
            .to_vec(),
            col_date: "Date".into(),
            col_isin: "ISIN".into(),
            col_time: "Time".into(),
            col_start_price: "StartPrice".into(),
            col_min_price: "MinPrice".into(),
            col_max_price: "MaxPrice".into(),
            col_traded_vol: "TradedVolume".into(),
        }
    }

    fn target_config() -> TargetConfig {
        TargetConfig {
            col_isin: "isin".into(),
            col_date: "date".into(),
            col_op_price: "opening_price_eur".into(),
            col_clos_price: "closing_price_eur".into(),
            col_min_price: "minimum_price_eur".into(),
            col_max_price: "maximum_price_eur".into(),
            col_daily_traded_vol: "daily_traded_volume".into(),
            col_change_prev_close: "change_prev_closing_%".into(),
            key: "report1/xetra_daily_report1_".into(),
            key_date_format: "%Y%m%d_%H%M%S".into(),
            format: FileFormat::Parquet,
        }
    }

    /// Nine ticks of one instrument over 2021-04-15..=2021-04-19.
    fn ticks() -> DataFrame {
        df! {
            "ISIN" => &["AT0000A0E9W5"; 9],
            "Mnemonic" => &["SANT"; 9],
            "Date" => &[
                "2021-04-15", "2021-04-16", "2021-04-17", "2021-04-17", "2021-04-18",
                "2021-04-18", "2021-04-19", "2021-04-19", "2021-04-19",
            ],
            "Time" => &["12:00", "15:00", "13:00", "14:00", "07:00", "08:00", "07:00", "08:00", "09:00"],
            "StartPrice" => &[20.19, 18.27, 20.21, 18.27, 20.58, 19.27, 23.58, 23.58, 24.22],
            "EndPrice" => &[18.45, 21.19, 18.27, 21.19, 19.27, 21.14, 23.58, 24.22, 22.21],
            "MinPrice" => &[18.20, 18.27, 18.21, 18.27, 18.89, 19.27, 23.58, 23.31, 22.21],
            "MaxPrice" => &[20.33, 21.34, 20.42, 21.34, 20.58, 21.14, 23.58, 24.34, 25.01],
            "TradedVolume" => &[877i64, 987, 633, 455, 9066, 1220, 1035, 1028, 1523],
        }
        .unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn f64_col(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name).unwrap().f64().unwrap().into_iter().collect()
    }

    fn str_col(df: &DataFrame, name: &str) -> Vec<String> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn empty_input_returns_empty_frame() {
        let out = transform_report1(
            DataFrame::empty(),
            &source_config(),
            &target_config(),
            d(2021, 4, 1),
        )
        .unwrap();
        assert_eq!(out.height(), 0);
    }

    #[test]
    fn daily_report_matches_hand_computed_values() {
        // 04-16 is the lookback day; 04-15 is read but never emitted.
        let out = transform_report1(ticks(), &source_config(), &target_config(), d(2021, 4, 17))
            .unwrap();

        assert_eq!(
            out.get_column_names_str(),
            vec![
                "isin",
                "date",
                "opening_price_eur",
                "closing_price_eur",
                "minimum_price_eur",
                "maximum_price_eur",
                "daily_traded_volume",
                "change_prev_closing_%",
            ]
        );
        assert_eq!(str_col(&out, "date"), vec!["2021-04-17", "2021-04-18", "2021-04-19"]);
        assert_eq!(
            f64_col(&out, "opening_price_eur"),
            vec![Some(20.21), Some(20.58), Some(23.58)]
        );
        assert_eq!(
            f64_col(&out, "closing_price_eur"),
            vec![Some(18.27), Some(19.27), Some(24.22)]
        );
        assert_eq!(
            f64_col(&out, "minimum_price_eur"),
            vec![Some(18.21), Some(18.89), Some(22.21)]
        );
        assert_eq!(
            f64_col(&out, "maximum_price_eur"),
            vec![Some(21.34), Some(21.14), Some(25.01)]
        );
        let volume: Vec<Option<i64>> = out
            .column("daily_traded_volume")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(volume, vec![Some(1088), Some(10286), Some(3586)]);
        // 04-17 closes at the 04-16 close, then (19.27-18.27)/18.27, (24.22-19.27)/19.27.
        assert_eq!(
            f64_col(&out, "change_prev_closing_%"),
            vec![Some(0.0), Some(5.47), Some(25.69)]
        );
    }

    #[test]
    fn first_date_of_instrument_has_null_change() {
        let out = transform_report1(ticks(), &source_config(), &target_config(), d(2021, 4, 1))
            .unwrap();
        assert_eq!(out.height(), 5);
        let change = f64_col(&out, "change_prev_closing_%");
        assert_eq!(change[0], None);
        // 04-16 vs 04-15: (18.27-20.19)/20.19
        assert_eq!(change[1], Some(-9.51));
    }

    #[test]
    fn never_emits_rows_before_cutoff() {
        for day in 15..=20 {
            let cutoff = d(2021, 4, day);
            let out =
                transform_report1(ticks(), &source_config(), &target_config(), cutoff).unwrap();
            let earliest = format_date(cutoff);
            assert!(str_col(&out, "date").iter().all(|dt| *dt >= earliest));
            assert_eq!(out.height(), (20 - day).min(5) as usize);
        }
    }

    #[test]
    fn input_order_does_not_matter() {
        let shuffled = ticks()
            .take(&IdxCa::new("idx".into(), &[8, 3, 0, 5, 1, 7, 2, 6, 4]))
            .unwrap();
        let a = transform_report1(ticks(), &source_config(), &target_config(), d(2021, 4, 16))
            .unwrap();
        let b = transform_report1(shuffled, &source_config(), &target_config(), d(2021, 4, 16))
            .unwrap();
        assert!(a.equals_missing(&b));
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let raw = df! {
            "ISIN" => &["X", "X", "X"],
            "Mnemonic" => &["M", "M", "M"],
            "Date" => &["2021-04-17", "2021-04-17", "2021-04-17"],
            "Time" => &["09:00", "10:00", "11:00"],
            "StartPrice" => &[Some(10.0), Some(11.0), None],
            "EndPrice" => &[10.5, 11.5, 99.0],
            "MinPrice" => &[9.5, 10.5, 1.0],
            "MaxPrice" => &[10.5, 11.5, 99.0],
            "TradedVolume" => &[100i64, 200, 300],
        }
        .unwrap();
        let out =
            transform_report1(raw, &source_config(), &target_config(), d(2021, 4, 1)).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(f64_col(&out, "closing_price_eur"), vec![Some(11.0)]);
        assert_eq!(f64_col(&out, "minimum_price_eur"), vec![Some(9.5)]);
    }

    #[test]
    fn instruments_do_not_share_previous_close() {
        let raw = df! {
            "ISIN" => &["A", "B", "A", "B"],
            "Mnemonic" => &["a", "b", "a", "b"],
            "Date" => &["2021-04-17", "2021-04-17", "2021-04-18", "2021-04-18"],
            "Time" => &["09:00", "09:00", "09:00", "09:00"],
            "StartPrice" => &[10.0, 50.0, 11.0, 45.0],
            "EndPrice" => &[10.0, 50.0, 11.0, 45.0],
            "MinPrice" => &[10.0, 50.0, 11.0, 45.0],
            "MaxPrice" => &[10.0, 50.0, 11.0, 45.0],
            "TradedVolume" => &[1i64, 1, 1, 1],
        }
        .unwrap();
        let out =
            transform_report1(raw, &source_config(), &target_config(), d(2021, 4, 18)).unwrap();
        assert_eq!(str_col(&out, "isin"), vec!["A", "B"]);
        assert_eq!(
            f64_col(&out, "change_prev_closing_%"),
            vec![Some(10.0), Some(-10.0)]
        );
    }

    #[test]
    fn missing_source_column_is_reported() {
        let raw = ticks().drop("MaxPrice").unwrap();
        let err = transform_report1(raw, &source_config(), &target_config(), d(2021, 4, 1))
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingColumn(ref c) if c == "MaxPrice"));
    }

    #[test]
    fn round2_breaks_ties_to_even() {
        assert_eq!(round2(5.474_332), 5.47);
        assert_eq!(round2(25.687_597), 25.69);
        assert_eq!(round2(-0.125), -0.12);
        assert_eq!(round2(0.375), 0.38);
    }

    #[test]
    fn exact_half_cent_prices_round_to_even() {
        let raw = df! {
            "ISIN" => &["X"],
            "Mnemonic" => &["M"],
            "Date" => &["2021-04-17"],
            "Time" => &["09:00"],
            "StartPrice" => &[10.125],
            "EndPrice" => &[10.125],
            "MinPrice" => &[0.125],
            "MaxPrice" => &[12.625],
            "TradedVolume" => &[1i64],
        }
        .unwrap();
        let out =
            transform_report1(raw, &source_config(), &target_config(), d(2021, 4, 17)).unwrap();
        assert_eq!(f64_col(&out, "opening_price_eur"), vec![Some(10.12)]);
        assert_eq!(f64_col(&out, "closing_price_eur"), vec![Some(10.12)]);
        assert_eq!(f64_col(&out, "minimum_price_eur"), vec![Some(0.12)]);
        assert_eq!(f64_col(&out, "maximum_price_eur"), vec![Some(12.62)]);
    }

    #[test]
    fn text_volume_column_is_summed_as_integers() {
        let raw = df! {
            "ISIN" => &["X", "X", "X"],
            "Mnemonic" => &["M", "M", "M"],
            "Date" => &["2021-04-17", "2021-04-17", "2021-04-17"],
            "Time" => &["09:00", "10:00", "11:00"],
            "StartPrice" => &[3.0, 4.0, 5.0],
            "EndPrice" => &[3.0, 4.0, 5.0],
            "MinPrice" => &[3.0, 4.0, 5.0],
            "MaxPrice" => &[3.0, 4.0, 5.0],
            "TradedVolume" => &[Some("3"), None, Some("7")],
        }
        .unwrap();
        let out =
            transform_report1(raw, &source_config(), &target_config(), d(2021, 4, 17)).unwrap();
        let volume = out.column("daily_traded_volume").unwrap();
        assert_eq!(volume.dtype(), &DataType::Int64);
        assert_eq!(volume.i64().unwrap().get(0), Some(10));
        assert_eq!(f64_col(&out, "closing_price_eur"), vec![Some(5.0)]);
    }
}
