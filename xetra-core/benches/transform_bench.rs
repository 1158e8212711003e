//! Aggregation throughput on synthetic tick data.

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polars::prelude::*;
use xetra_core::config::{SourceConfig, TargetConfig};
use xetra_core::schema::{format_date, FileFormat};
use xetra_core::transform::transform_report1;

fn source_config() -> SourceConfig {
    SourceConfig {
        first_extract_date: NaiveDate::from_ymd_opt(2021, 4, 1).unwrap(),
        columns: ["ISIN", "Date", "Time", "StartPrice", "MinPrice", "MaxPrice", "TradedVolume"]
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

/// `instruments` x `days` x 60 minute bars with a deterministic price walk.
fn ticks(instruments: usize, days: usize) -> DataFrame {
    let start = NaiveDate::from_ymd_opt(2021, 4, 1).unwrap();
    let n = instruments * days * 60;
    let mut isin = Vec::with_capacity(n);
    let mut date = Vec::with_capacity(n);
    let mut time = Vec::with_capacity(n);
    let mut price = Vec::with_capacity(n);
    let mut volume = Vec::with_capacity(n);

    for i in 0..instruments {
        for d in 0..days {
            let day = format_date(start + Duration::days(d as i64));
            for m in 0..60 {
                isin.push(format!("DE{i:010}"));
                date.push(day.clone());
                time.push(format!("{:02}:{:02}", 8 + m / 60, m % 60));
                price.push(10.0 + ((i * 31 + d * 7 + m) % 97) as f64 / 10.0);
                volume.push(((i + d + m) % 500) as i64);
            }
        }
    }

    let min: Vec<f64> = price.iter().map(|p| p - 0.05).collect();
    let max: Vec<f64> = price.iter().map(|p| p + 0.05).collect();
    df! {
        "ISIN" => isin,
        "Date" => date,
        "Time" => time,
        "StartPrice" => price,
        "MinPrice" => min,
        "MaxPrice" => max,
        "TradedVolume" => volume,
    }
    .unwrap()
}

fn bench_transform(c: &mut Criterion) {
    let src = source_config();
    let trg = target_config();
    let cutoff = NaiveDate::from_ymd_opt(2021, 4, 2).unwrap();

    let mut group = c.benchmark_group("transform_report1");
    for instruments in [10usize, 100, 500] {
        let raw = ticks(instruments, 5);
        group.bench_with_input(BenchmarkId::from_parameter(instruments), &raw, |b, raw| {
            b.iter(|| transform_report1(black_box(raw.clone()), &src, &trg, cutoff).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_transform);
criterion_main!(benches);
