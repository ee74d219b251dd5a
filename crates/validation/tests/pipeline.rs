//! Validation of a detect -> extract -> aggregate pipeline.

use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use zone_analysis_core::{
    BarFrame, ColumnConfig, DictRecord, Result, ValidationSettings, ZoneDetector, ZoneRecord,
    ZoneType,
};
use zone_analysis_features::ZoneFeatureExtractor;
use zone_analysis_validation::{
    ParameterGrid, ParameterSet, ShuffleMethod, ValidationSuite, ValidationType,
    WalkForwardConfig, WindowResult,
};

struct SignRuns;

impl ZoneDetector for SignRuns {
    fn detect(&self, frame: &BarFrame) -> Result<Vec<ZoneRecord>> {
        let osc = frame.column("macd")?;
        let mut zones = Vec::new();
        let mut start = 0;
        for i in 1..=osc.len() {
            if i == osc.len() || ZoneType::from_value(osc[i]) != ZoneType::from_value(osc[start]) {
                zones.push(ZoneRecord::new(
                    zones.len(),
                    ZoneType::from_value(osc[start]),
                    frame.slice(start..i)?,
                )?);
                start = i;
            }
        }
        Ok(zones)
    }
}

fn market(n: usize) -> BarFrame {
    let start = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    let mut close = Vec::with_capacity(n);
    let mut price = 40.0;
    for i in 0..n {
        let t = i as f64;
        price *= 1.0 + 0.004 * (t / 30.0).sin() + 0.0015 * (t * 1.9).cos();
        close.push(price);
    }
    let open: Vec<f64> = std::iter::once(close[0]).chain(close[..n - 1].iter().copied()).collect();
    let high = close.iter().zip(&open).map(|(c, o)| c.max(*o) * 1.002).collect();
    let low = close.iter().zip(&open).map(|(c, o)| c.min(*o) * 0.998).collect();

    BarFrame::builder()
        .index((0..n).map(|i| start + Duration::minutes(15 * i as i64)).collect())
        .ohlc(open, high, low, close)
        .volume((0..n).map(|i| 1_000.0 + 250.0 * (i as f64 / 5.0).sin().abs()).collect())
        .build()
        .unwrap()
}

fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut level = values[0];
    values
        .iter()
        .map(|v| {
            level += alpha * (v - level);
            level
        })
        .collect()
}

/// MACD(12, 26, 9) derived from the frame's own closes.
fn with_macd(frame: &BarFrame) -> Result<BarFrame> {
    let macd: Vec<f64> = ema(frame.close(), 12)
        .iter()
        .zip(ema(frame.close(), 26))
        .map(|(fast, slow)| fast - slow)
        .collect();
    let hist = macd.iter().zip(ema(&macd, 9)).map(|(m, s)| m - s).collect();
    frame.with_column("macd", macd)?.with_column("macd_hist", hist)
}

fn aggregate(frame: &BarFrame, min_duration: usize) -> anyhow::Result<BTreeMap<String, f64>> {
    let frame = with_macd(frame)?;
    let zones = SignRuns.detect(&frame)?;
    let records = ZoneFeatureExtractor::with_defaults(ColumnConfig::default())?
        .with_admission(min_duration, 0.0)
        .extract_all(&zones)?;
    if records.is_empty() {
        anyhow::bail!("no zones admitted");
    }
    let n = records.len() as f64;
    let mean_abs_return = records.iter().map(|r| r.return_pct.abs()).sum::<f64>() / n;
    let mean_duration = records.iter().map(|r| r.duration as f64).sum::<f64>() / n;
    let positive_share = records
        .iter()
        .filter(|r| r.zone_type == ZoneType::Positive)
        .count() as f64
        / n;
    Ok(BTreeMap::from([
        ("zones".to_string(), n),
        ("mean_abs_return".to_string(), mean_abs_return),
        ("mean_duration".to_string(), mean_duration),
        ("positive_share".to_string(), positive_share),
    ]))
}

fn analyze(frame: &BarFrame) -> anyhow::Result<BTreeMap<String, f64>> {
    aggregate(frame, 1)
}

fn suite() -> ValidationSuite {
    ValidationSuite::new(ValidationSettings {
        n_simulations: 12,
        ..ValidationSettings::default()
    })
}

#[test]
fn out_of_sample_over_the_pipeline() {
    let result = suite()
        .out_of_sample(&market(600), "mean_abs_return", None, analyze)
        .unwrap();
    assert_eq!(result.validation_type, ValidationType::OutOfSample);
    assert!(result.degradation_pct.is_some());
    assert!(result.train_metrics["zones"] > result.test_metrics["zones"]);
    assert_eq!(result.metadata["train_bars"], json!(420));

    let back = zone_analysis_validation::ValidationResult::from_dict(result.to_dict()).unwrap();
    assert_eq!(back, result);
}

#[test]
fn walk_forward_over_the_pipeline_is_chronological() {
    let data = market(800);
    let result = suite()
        .walk_forward(&data, "mean_abs_return", &WalkForwardConfig::new(300, 100, 100), analyze)
        .unwrap();
    assert_eq!(result.iterations, Some(5));
    for window in result.metadata["windows"].as_array().unwrap() {
        let step = WindowResult::from_dict(window.clone()).unwrap();
        assert!(step.train_end < step.test_start);
        assert_eq!(data.index()[step.test_range.0], step.test_start);
    }
}

#[test]
fn sensitivity_over_admission_filters() {
    let grid: ParameterGrid =
        BTreeMap::from([("min_duration".to_string(), vec![json!(1), json!(5), json!(10)])]);
    let result = suite()
        .sensitivity(&market(500), "zones", &grid, |frame: &BarFrame, params: &ParameterSet| {
            let min_duration = params["min_duration"].as_u64().unwrap_or(1) as usize;
            aggregate(frame, min_duration)
        })
        .unwrap();
    assert_eq!(result.iterations, Some(3));
    assert_eq!(result.metadata["best_params"], json!({ "min_duration": 1 }));
}

#[test]
fn monte_carlo_separates_real_cycles_from_shuffled_returns() {
    let data = market(800);
    let result = suite()
        .monte_carlo(&data, "mean_duration", ShuffleMethod::ShuffleReturns, analyze)
        .unwrap();
    assert_eq!(result.iterations, Some(12));
    assert_eq!(result.metadata["method"], json!("shuffle_returns"));
    assert_eq!(result.metadata["failed"], json!(0));

    let real = result.metadata["real_metric"].as_f64().unwrap();
    let synthetic_mean = result.metadata["synthetic_mean"].as_f64().unwrap();
    let synthetic_std = result.metadata["synthetic_std"].as_f64().unwrap();
    assert!(synthetic_std > 0.0);
    assert!(result.metadata["z_score"].as_f64().unwrap() > 0.0);
    assert!(real > synthetic_mean);
    assert!(result.success);
}

#[test]
fn monte_carlo_with_shuffled_bars_sees_realigned_indicators() {
    // reads the stored indicator instead of recomputing it
    fn stored_zone_count(frame: &BarFrame) -> anyhow::Result<BTreeMap<String, f64>> {
        let zones = SignRuns.detect(frame)?;
        Ok(BTreeMap::from([("zones".to_string(), zones.len() as f64)]))
    }

    let data = with_macd(&market(400)).unwrap();
    let result = suite()
        .monte_carlo(&data, "zones", ShuffleMethod::ShufflePrices, stored_zone_count)
        .unwrap();
    assert_eq!(result.metadata["failed"], json!(0));
    let real = result.metadata["real_metric"].as_f64().unwrap();
    let synthetic_mean = result.metadata["synthetic_mean"].as_f64().unwrap();
    assert!(synthetic_mean > 2.0 * real);
}
