//! Hypothesis, regression and sequence analysis over extracted zones.

use chrono::{Duration, TimeZone, Utc};
use zone_analysis_core::{
    AnalysisConfig, BarFrame, ColumnConfig, DictRecord, Result, ZoneDetector, ZoneRecord, ZoneType,
};
use zone_analysis_features::{ZoneFeatureExtractor, ZoneFeatureRecord};
use zone_analysis_statistics::{
    HypothesisSummary, HypothesisTestSuite, PatternAlphabet, RegressionAnalyzer,
    RegressionTarget, SequenceAnalyzer, TestParams, TEST_NAMES,
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

fn records() -> Vec<ZoneFeatureRecord> {
    let n = 1500;
    let start = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
    let mut close = Vec::with_capacity(n);
    let mut price = 250.0;
    for i in 0..n {
        let t = i as f64;
        price *= 1.0 + 0.003 * (t / 11.0 + (t / 97.0).sin()).sin() + 0.001 * (t * 2.3).cos();
        close.push(price);
    }
    let open: Vec<f64> = std::iter::once(close[0]).chain(close[..n - 1].iter().copied()).collect();
    let high: Vec<f64> = close.iter().zip(&open).map(|(c, o)| c.max(*o) * 1.001).collect();
    let low: Vec<f64> = close.iter().zip(&open).map(|(c, o)| c.min(*o) * 0.999).collect();
    let macd: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64;
            (t / 11.0 + (t / 97.0).sin()).sin() + 0.1
        })
        .collect();
    let hist: Vec<f64> = macd.windows(2).map(|w| w[1] - w[0]).chain([0.0]).collect();

    let frame = BarFrame::builder()
        .index((0..n).map(|i| start + Duration::hours(i as i64)).collect())
        .ohlc(open, high, low, close)
        .volume((0..n).map(|i| 500.0 + 100.0 * (i as f64 / 7.0).cos().abs()).collect())
        .column("macd", macd)
        .column("macd_hist", hist)
        .build()
        .unwrap();

    let zones = SignRuns.detect(&frame).unwrap();
    ZoneFeatureExtractor::with_defaults(ColumnConfig::default())
        .unwrap()
        .extract_all(&zones)
        .unwrap()
}

#[test]
fn full_battery_runs_on_extracted_zones() {
    let records = records();
    assert!(records.len() >= 20);

    let suite = HypothesisTestSuite::from_config(&records, &AnalysisConfig::default()).unwrap();
    let summary = suite.run_all().unwrap();
    assert_eq!(summary.total + summary.skipped.len(), TEST_NAMES.len());
    for result in &summary.results {
        assert!((0.0..=1.0).contains(&result.p_value), "{}", result.test_name);
        assert_eq!(result.significant, result.p_value < 0.05);
    }
    assert!(summary.get("stationarity").is_some());

    let back = HypothesisSummary::from_dict(summary.to_dict()).unwrap();
    assert_eq!(back, summary);
}

#[test]
fn explicit_levels_are_forwarded() {
    let records = records();
    let suite = HypothesisTestSuite::new(&records, 0.05).unwrap();
    let level = records[records.len() / 2].start_price;
    let params = TestParams::default().with_price_levels(vec![level]);
    match suite.run_single("support_resistance", &params) {
        Ok(result) => assert_eq!(result.metadata["levels"], serde_json::json!([level])),
        Err(e) => assert!(e.is_insufficient_data()),
    }
}

#[test]
fn regression_on_indicator_area() {
    let records = records();
    let result = RegressionAnalyzer::new()
        .fit(RegressionTarget::Duration, &records, Some(&["indicator_area", "amplitude"][..]))
        .unwrap();
    assert!((0.0..=1.0).contains(&result.r_squared));
    assert_eq!(result.n_obs + result.dropped, records.len());
    assert_eq!(result.residuals.len(), result.n_obs);
    assert_eq!(result.coefficients.len(), 3);
}

#[test]
fn sign_run_zones_always_alternate() {
    let records = records();
    let analyzer = SequenceAnalyzer::default();
    let table = analyzer.transitions(&records);
    assert_eq!(table.probability(ZoneType::Positive, ZoneType::Negative), 1.0);
    assert_eq!(table.probability(ZoneType::Negative, ZoneType::Positive), 1.0);

    let runs = analyzer.runs_test(&records).unwrap();
    assert!(runs.statistic > 0.0);

    let patterns = analyzer.patterns(&records, PatternAlphabet::Type).unwrap();
    assert_eq!(patterns.len(), 2);
}

#[test]
fn clustering_covers_every_zone() {
    let records = records();
    let analysis = SequenceAnalyzer::default().cluster(&records, 3, None).unwrap();
    assert_eq!(analysis.assignments.len() + analysis.dropped, records.len());
    assert_eq!(
        analysis.clusters.iter().map(|c| c.size).sum::<usize>(),
        analysis.assignments.len()
    );
    if let Some(s) = analysis.silhouette {
        assert!((-1.0..=1.0).contains(&s));
    }
}
