//! Battery of hypothesis tests over zone feature records.
//!
//! Every test returns a [`HypothesisTestResult`] evaluated at the suite's
//! alpha. Tests refuse to run on groups below their documented minimum and
//! report [`AnalysisError::InsufficientData`] instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use zone_analysis_core::stats::{mean, median, negligible_spread, pearson_test, sample_variance};
use zone_analysis_core::{AnalysisConfig, AnalysisError, HypothesisSettings, Result, ZoneType};
use zone_analysis_features::ZoneFeatureRecord;

use crate::adf::{adf_test, ADF_MIN_OBSERVATIONS};
use crate::inference::{mann_whitney_u, shapiro_wilk, student_t_test, TwoSampleTest};
use crate::levels::{distance_to_nearest_pct, identify_levels};
use crate::result::{HypothesisSummary, HypothesisTestResult};

/// Names accepted by [`HypothesisTestSuite::run_single`], in `run_all` order.
pub const TEST_NAMES: &[&str] = &[
    "duration_effect",
    "asymmetry",
    "correlation_drawdown",
    "stationarity",
    "support_resistance",
];

const DEFAULT_OUTCOME: &str = "return_pct";

/// Optional arguments forwarded to a single test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestParams {
    /// Feature compared between groups (see `ZoneFeatureRecord::numeric_feature`).
    pub metric: Option<String>,
    /// Explicit support/resistance levels; skips auto-identification.
    pub price_levels: Option<Vec<f64>>,
    /// Clustering tolerance for auto-identified levels, in percent.
    pub tolerance_pct: Option<f64>,
}

impl TestParams {
    #[must_use]
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    #[must_use]
    pub fn with_price_levels(mut self, levels: Vec<f64>) -> Self {
        self.price_levels = Some(levels);
        self
    }

    #[must_use]
    pub fn with_tolerance_pct(mut self, tolerance_pct: f64) -> Self {
        self.tolerance_pct = Some(tolerance_pct);
        self
    }
}

/// Stateless test battery bound to an immutable slice of records.
#[derive(Debug, Clone)]
pub struct HypothesisTestSuite<'a> {
    records: &'a [ZoneFeatureRecord],
    alpha: f64,
    settings: HypothesisSettings,
}

impl<'a> HypothesisTestSuite<'a> {
    /// Creates a suite with default settings.
    ///
    /// # Errors
    /// Returns [`AnalysisError::Configuration`] if `alpha` is not in (0, 1).
    pub fn new(records: &'a [ZoneFeatureRecord], alpha: f64) -> Result<Self> {
        if alpha.is_nan() || alpha <= 0.0 || alpha >= 1.0 {
            return Err(AnalysisError::configuration(
                "alpha",
                format!("must be in (0, 1), got {alpha}"),
            ));
        }
        Ok(Self {
            records,
            alpha,
            settings: HypothesisSettings::default(),
        })
    }

    /// Creates a suite from the pipeline configuration.
    ///
    /// # Errors
    /// Returns the first validation error of `config`.
    pub fn from_config(records: &'a [ZoneFeatureRecord], config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(records, config.alpha)?.with_settings(config.hypothesis.clone()))
    }

    #[must_use]
    pub fn with_settings(mut self, settings: HypothesisSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[must_use]
    pub fn settings(&self) -> &HypothesisSettings {
        &self.settings
    }

    /// Runs every test in [`TEST_NAMES`].
    ///
    /// Tests lacking data are recorded in `skipped`; any other error aborts.
    ///
    /// # Errors
    /// Propagates configuration and numerical errors of individual tests.
    pub fn run_all(&self) -> Result<HypothesisSummary> {
        let mut results = Vec::with_capacity(TEST_NAMES.len());
        let mut skipped = BTreeMap::new();

        for name in TEST_NAMES {
            match self.run_single(name, &TestParams::default()) {
                Ok(result) => results.push(result),
                Err(e) if e.is_insufficient_data() => {
                    warn!(test = %name, error = %e, "Hypothesis test skipped");
                    skipped.insert((*name).to_string(), e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let significant = results.iter().filter(|r| r.significant).count();
        info!(
            zones = self.records.len(),
            total = results.len(),
            significant,
            skipped = skipped.len(),
            "Hypothesis battery complete"
        );
        Ok(HypothesisSummary {
            total: results.len(),
            significant,
            skipped,
            results,
        })
    }

    /// Runs one test by name.
    ///
    /// # Errors
    /// Returns [`AnalysisError::Configuration`] for an unknown name and the
    /// test's own error otherwise.
    pub fn run_single(&self, test_name: &str, params: &TestParams) -> Result<HypothesisTestResult> {
        let result = match test_name {
            "duration_effect" => self.duration_effect(params.metric.as_deref()),
            "asymmetry" => self.asymmetry(params.metric.as_deref()),
            "correlation_drawdown" => self.correlation_drawdown(),
            "stationarity" => self.stationarity(),
            "support_resistance" => self.support_resistance(params),
            other => Err(AnalysisError::configuration(
                "test_name",
                format!("unknown test '{other}' (available: {})", TEST_NAMES.join(", ")),
            )),
        }?;
        debug!(
            test = %result.test_name,
            statistic = result.statistic,
            p_value = result.p_value,
            significant = result.significant,
            "Hypothesis test complete"
        );
        Ok(result)
    }

    // ============================================
    // Individual tests
    // ============================================

    /// Compares the magnitude of `metric` between zones up to the median
    /// duration and longer zones, and reports the duration/magnitude correlation.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] when either group has fewer
    /// than two zones.
    pub fn duration_effect(&self, metric: Option<&str>) -> Result<HypothesisTestResult> {
        let metric = metric.unwrap_or(DEFAULT_OUTCOME);
        let pairs: Vec<(f64, f64)> = self
            .records
            .iter()
            .filter_map(|r| Some((r.duration as f64, r.numeric_feature(metric)?.abs())))
            .collect();
        let durations: Vec<f64> = pairs.iter().map(|(d, _)| *d).collect();
        let split = median(&durations)
            .ok_or_else(|| AnalysisError::insufficient("duration_effect", 4, 0))?;

        let (short, long): (Vec<&(f64, f64)>, Vec<&(f64, f64)>) = pairs.iter().partition(|(d, _)| *d <= split);
        let short: Vec<f64> = short.into_iter().map(|(_, v)| *v).collect();
        let long: Vec<f64> = long.into_iter().map(|(_, v)| *v).collect();
        guard_group("duration_effect (short zones)", &short)?;
        guard_group("duration_effect (long zones)", &long)?;

        let test = student_t_test(&long, &short)?;
        let magnitudes: Vec<f64> = pairs.iter().map(|(_, v)| *v).collect();
        let correlation = pearson_test(&durations, &magnitudes);

        Ok(HypothesisTestResult::new(
            "duration_effect",
            format!("mean |{metric}| of long zones equals that of short zones"),
            test.statistic,
            test.p_value,
            self.alpha,
        )
        .with_effect_size(Some(test.effect_size))
        .with_meta("metric", metric)
        .with_meta("test_used", "t_test")
        .with_meta("median_duration", split)
        .with_meta("n_short", short.len())
        .with_meta("n_long", long.len())
        .with_meta("mean_short", mean(&short))
        .with_meta("mean_long", mean(&long))
        .with_meta("duration_correlation", correlation.map(|(r, _)| r))
        .with_meta("duration_correlation_p_value", correlation.map(|(_, p)| p)))
    }

    /// Compares the magnitude of `metric` between positive and negative zones.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] when either zone type has
    /// fewer than two values.
    pub fn asymmetry(&self, metric: Option<&str>) -> Result<HypothesisTestResult> {
        let metric = metric.unwrap_or(self.settings.asymmetry_metric.as_str());
        let positive = self.values_where(metric, |r| r.zone_type == ZoneType::Positive);
        let negative = self.values_where(metric, |r| r.zone_type == ZoneType::Negative);
        guard_group("asymmetry (positive zones)", &positive)?;
        guard_group("asymmetry (negative zones)", &negative)?;

        let test = student_t_test(&positive, &negative)?;
        Ok(HypothesisTestResult::new(
            "asymmetry",
            format!("mean |{metric}| is equal for positive and negative zones"),
            test.statistic,
            test.p_value,
            self.alpha,
        )
        .with_effect_size(Some(test.effect_size))
        .with_meta("metric", metric)
        .with_meta("test_used", "t_test")
        .with_meta("n_positive", positive.len())
        .with_meta("n_negative", negative.len())
        .with_meta("mean_positive", mean(&positive))
        .with_meta("mean_negative", mean(&negative)))
    }

    /// Compares the adverse move (drawdown in positive zones, rally in
    /// negative zones) between zones with high and low price/indicator
    /// correlation, plus the overall correlation of the two quantities.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] when either correlation
    /// group has fewer than two zones.
    pub fn correlation_drawdown(&self) -> Result<HypothesisTestResult> {
        let pairs: Vec<(f64, f64)> = self
            .records
            .iter()
            .filter_map(|r| Some((r.price_indicator_correlation?, r.adverse_move_pct()?)))
            .filter(|(c, a)| c.is_finite() && a.is_finite())
            .collect();

        let high: Vec<f64> = pairs
            .iter()
            .filter(|(c, _)| *c > self.settings.high_correlation)
            .map(|(_, a)| *a)
            .collect();
        let low: Vec<f64> = pairs
            .iter()
            .filter(|(c, _)| *c < self.settings.low_correlation)
            .map(|(_, a)| *a)
            .collect();
        guard_group("correlation_drawdown (high correlation)", &high)?;
        guard_group("correlation_drawdown (low correlation)", &low)?;

        let test = student_t_test(&high, &low)?;
        let correlations: Vec<f64> = pairs.iter().map(|(c, _)| *c).collect();
        let adverse: Vec<f64> = pairs.iter().map(|(_, a)| *a).collect();
        let overall = pearson_test(&correlations, &adverse);

        Ok(HypothesisTestResult::new(
            "correlation_drawdown",
            "mean adverse move is equal for high- and low-correlation zones",
            test.statistic,
            test.p_value,
            self.alpha,
        )
        .with_effect_size(Some(test.effect_size))
        .with_meta("test_used", "t_test")
        .with_meta("high_threshold", self.settings.high_correlation)
        .with_meta("low_threshold", self.settings.low_correlation)
        .with_meta("n_high", high.len())
        .with_meta("n_low", low.len())
        .with_meta("mean_adverse_high", mean(&high))
        .with_meta("mean_adverse_low", mean(&low))
        .with_meta("overall_correlation", overall.map(|(r, _)| r))
        .with_meta("overall_p_value", overall.map(|(_, p)| p)))
    }

    /// ADF test on zone durations in chronological order.
    ///
    /// A constant duration series is reported as stationary with `p = 0`
    /// and `constant_series = true` in the metadata.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] below ten zones.
    pub fn stationarity(&self) -> Result<HypothesisTestResult> {
        let mut ordered: Vec<&ZoneFeatureRecord> = self.records.iter().collect();
        ordered.sort_by_key(|r| (r.start_time, r.id));
        let durations: Vec<f64> = ordered.iter().map(|r| r.duration as f64).collect();
        if durations.len() < ADF_MIN_OBSERVATIONS {
            return Err(AnalysisError::insufficient(
                "stationarity",
                ADF_MIN_OBSERVATIONS,
                durations.len(),
            ));
        }

        let hypothesis = "zone duration series has a unit root";
        let index: Vec<f64> = (0..durations.len()).map(|i| i as f64).collect();
        let trend = pearson_test(&index, &durations);

        if negligible_spread(sample_variance(&durations).unwrap_or(0.0), &durations) {
            return Ok(
                HypothesisTestResult::new("stationarity", hypothesis, f64::NEG_INFINITY, 0.0, self.alpha)
                    .with_meta("constant_series", true)
                    .with_meta("stationary", true)
                    .with_meta("n", durations.len())
                    .with_meta("trend_correlation", Value::Null)
                    .with_meta("trend_p_value", Value::Null),
            );
        }

        let adf = adf_test(&durations)?;
        let stationary = adf.is_stationary(self.alpha);
        Ok(
            HypothesisTestResult::new("stationarity", hypothesis, adf.statistic, adf.p_value, self.alpha)
                .with_meta("constant_series", false)
                .with_meta("stationary", stationary)
                .with_meta("n", durations.len())
                .with_meta("used_lag", adf.used_lag)
                .with_meta("nobs", adf.nobs)
                .with_meta("critical_values", json!(adf.critical_values))
                .with_meta("trend_correlation", trend.map(|(r, _)| r))
                .with_meta("trend_p_value", trend.map(|(_, p)| p)),
        )
    }

    /// Compares the magnitude of `metric` between zones starting near a
    /// support/resistance level and the rest.
    ///
    /// Levels come from `params.price_levels` or are clustered from zone
    /// start and end prices. The t-test is used when both groups pass
    /// Shapiro-Wilk at alpha, Mann-Whitney U otherwise.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] when no level is found or a
    /// proximity group has fewer than two zones, and
    /// [`AnalysisError::Configuration`] for a non-positive tolerance.
    pub fn support_resistance(&self, params: &TestParams) -> Result<HypothesisTestResult> {
        let metric = params.metric.as_deref().unwrap_or(DEFAULT_OUTCOME);
        let tolerance = params.tolerance_pct.unwrap_or(self.settings.level_tolerance_pct);
        if tolerance.is_nan() || tolerance <= 0.0 {
            return Err(AnalysisError::configuration(
                "tolerance_pct",
                format!("must be > 0, got {tolerance}"),
            ));
        }

        let (levels, auto) = match &params.price_levels {
            Some(levels) => (levels.clone(), false),
            None => {
                let prices: Vec<f64> = self
                    .records
                    .iter()
                    .flat_map(|r| [r.start_price, r.end_price])
                    .collect();
                let found = identify_levels(&prices, tolerance, self.settings.min_touches);
                (found.into_iter().map(|l| l.price).collect(), true)
            }
        };
        if levels.is_empty() {
            return Err(AnalysisError::insufficient("support_resistance price levels", 1, 0));
        }

        let mut near = Vec::new();
        let mut far = Vec::new();
        for record in self.records {
            let (Some(value), Some(distance)) = (
                record.numeric_feature(metric),
                distance_to_nearest_pct(record.start_price, &levels),
            ) else {
                continue;
            };
            if distance <= self.settings.proximity_tolerance_pct {
                near.push(value.abs());
            } else {
                far.push(value.abs());
            }
        }
        guard_group("support_resistance (near levels)", &near)?;
        guard_group("support_resistance (far from levels)", &far)?;

        let normal_near = is_normal(&near, self.alpha);
        let normal_far = is_normal(&far, self.alpha);
        let (test, test_used): (TwoSampleTest, &str) = if normal_near && normal_far {
            (student_t_test(&near, &far)?, "t_test")
        } else {
            (mann_whitney_u(&near, &far)?, "mann_whitney_u")
        };

        Ok(HypothesisTestResult::new(
            "support_resistance",
            format!("|{metric}| is distributed equally near and away from price levels"),
            test.statistic,
            test.p_value,
            self.alpha,
        )
        .with_effect_size(Some(test.effect_size))
        .with_meta("metric", metric)
        .with_meta("test_used", test_used)
        .with_meta("levels", levels)
        .with_meta("levels_auto_identified", auto)
        .with_meta("level_tolerance_pct", tolerance)
        .with_meta("proximity_tolerance_pct", self.settings.proximity_tolerance_pct)
        .with_meta("n_near", near.len())
        .with_meta("n_far", far.len())
        .with_meta("mean_near", mean(&near))
        .with_meta("mean_far", mean(&far))
        .with_meta("normal_near", normal_near)
        .with_meta("normal_far", normal_far))
    }

    fn values_where(&self, metric: &str, keep: impl Fn(&ZoneFeatureRecord) -> bool) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| keep(r))
            .filter_map(|r| r.numeric_feature(metric))
            .map(f64::abs)
            .collect()
    }
}

fn guard_group(context: &str, values: &[f64]) -> Result<()> {
    if values.len() < crate::inference::MIN_GROUP_SIZE {
        return Err(AnalysisError::insufficient(
            context,
            crate::inference::MIN_GROUP_SIZE,
            values.len(),
        ));
    }
    Ok(())
}

/// Shapiro-Wilk at `alpha`; groups the test cannot evaluate count as non-normal.
fn is_normal(values: &[f64], alpha: f64) -> bool {
    shapiro_wilk(values).map_or(false, |r| r.is_normal(alpha))
}
