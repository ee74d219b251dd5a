//! Robustness protocols over a black-box analysis.
//!
//! The suite wraps an `analyze` callable (typically detect zones, extract
//! features, aggregate) and perturbs its input four ways: a chronological
//! train/test split, a rolling walk-forward, a parameter sweep and a
//! Monte Carlo comparison against synthetic series.
//!
//! Errors raised by `analyze` on the real data propagate. In the sweep and
//! the Monte Carlo run a failing combination or simulation is logged and
//! counted instead, so one bad worker cannot poison the aggregate.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use zone_analysis_core::stats::{mean, percentile, percentile_rank, sample_std};
use zone_analysis_core::{
    AnalysisConfig, AnalysisError, BarFrame, DictRecord, Result, ValidationSettings,
};

use crate::metric::MetricSource;
use crate::result::{
    degradation_pct, stability_score, summary_metrics, ValidationResult, ValidationType,
    WindowResult,
};
use crate::synthetic::{synthesize, ShuffleMethod};

/// One parameter combination handed to a sensitivity analyze callable.
pub type ParameterSet = BTreeMap<String, Value>;

/// Candidate values per parameter name.
pub type ParameterGrid = BTreeMap<String, Vec<Value>>;

/// Minimum successful combinations or simulations for a spread to exist.
const MIN_SUCCESSES: usize = 2;

/// Window geometry for walk-forward validation, in bars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub train_bars: usize,
    pub test_bars: usize,
    /// Bars the windows advance per iteration.
    pub step_bars: usize,
    /// Keep the train window anchored at bar 0 and let it grow.
    pub anchored: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_bars: 200,
            test_bars: 50,
            step_bars: 50,
            anchored: false,
        }
    }
}

impl WalkForwardConfig {
    #[must_use]
    pub fn new(train_bars: usize, test_bars: usize, step_bars: usize) -> Self {
        Self {
            train_bars,
            test_bars,
            step_bars,
            anchored: false,
        }
    }

    #[must_use]
    pub fn with_anchored(mut self, anchored: bool) -> Self {
        self.anchored = anchored;
        self
    }

    /// # Errors
    /// Returns [`AnalysisError::Configuration`] when any window size is zero.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("train_bars", self.train_bars),
            ("test_bars", self.test_bars),
            ("step_bars", self.step_bars),
        ] {
            if value == 0 {
                return Err(AnalysisError::configuration(name, "must be >= 1"));
            }
        }
        Ok(())
    }

    /// Train/test bar ranges over a series of `len` bars.
    ///
    /// Every test range starts where its train range ends. Windows that would
    /// run past the end of the series are not emitted.
    #[must_use]
    pub fn windows(&self, len: usize) -> Vec<(Range<usize>, Range<usize>)> {
        if self.validate().is_err() {
            return Vec::new();
        }
        let mut windows = Vec::new();
        let mut train_start = 0;
        let mut train_end = self.train_bars;

        while train_end + self.test_bars <= len {
            let test_end = train_end + self.test_bars;
            windows.push((train_start..train_end, train_end..test_end));
            train_end += self.step_bars;
            if !self.anchored {
                train_start += self.step_bars;
            }
        }
        windows
    }
}

/// Rolling walk-forward windows over `len` bars.
///
/// Returns no windows when any size is zero or the series is shorter than
/// one train plus one test window.
#[must_use]
pub fn walk_forward_windows(
    len: usize,
    train_bars: usize,
    test_bars: usize,
    step_bars: usize,
) -> Vec<(Range<usize>, Range<usize>)> {
    WalkForwardConfig::new(train_bars, test_bars, step_bars).windows(len)
}

/// Cartesian product of every value list in `grid`.
///
/// Parameters are combined in key order, the last key varying fastest.
///
/// # Errors
/// Returns [`AnalysisError::Configuration`] for an empty grid or a parameter
/// without values.
pub fn parameter_combinations(grid: &ParameterGrid) -> Result<Vec<ParameterSet>> {
    if grid.is_empty() {
        return Err(AnalysisError::configuration(
            "param_grid",
            "must name at least one parameter",
        ));
    }
    let mut combos = vec![ParameterSet::new()];
    for (name, values) in grid {
        if values.is_empty() {
            return Err(AnalysisError::configuration(
                format!("param_grid.{name}"),
                "needs at least one value",
            ));
        }
        combos = combos
            .into_iter()
            .flat_map(|combo| {
                values.iter().map(move |value| {
                    let mut next = combo.clone();
                    next.insert(name.clone(), value.clone());
                    next
                })
            })
            .collect();
    }
    Ok(combos)
}

/// Runs the four validation protocols against an analyze callable.
#[derive(Debug, Clone, Default)]
pub struct ValidationSuite {
    settings: ValidationSettings,
    cancel: Option<Arc<AtomicBool>>,
}

impl ValidationSuite {
    #[must_use]
    pub fn new(settings: ValidationSettings) -> Self {
        Self {
            settings,
            cancel: None,
        }
    }

    /// # Errors
    /// Returns the first violation reported by [`AnalysisConfig::validate`].
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.validation.clone()))
    }

    /// Polls `flag` between walk-forward windows, sweep combinations and
    /// simulations; once it is set the running protocol returns an error.
    #[must_use]
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AnalysisError::configuration(
                "cancellation",
                "validation run was cancelled",
            ))
        } else {
            Ok(())
        }
    }

    fn check_min_bars(&self, context: &str, data: &BarFrame) -> Result<()> {
        let required = self.settings.min_bars.max(2);
        if data.len() < required {
            return Err(AnalysisError::insufficient(context, required, data.len()));
        }
        Ok(())
    }

    fn run_batch<T, R, F>(&self, items: &[T], f: F) -> Vec<Result<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync + Send,
    {
        if self.settings.parallel {
            items.par_iter().map(|item| f(item)).collect()
        } else {
            items.iter().map(|item| f(item)).collect()
        }
    }

    /// Chronological train/test split.
    ///
    /// `train_ratio` overrides the configured ratio. Success means the metric
    /// lost less than the degradation threshold from train to test.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] below `min_bars`,
    /// [`AnalysisError::Configuration`] for a ratio outside (0, 1) or a
    /// missing metric, and any error raised by `analyze`.
    pub fn out_of_sample<F, O>(
        &self,
        data: &BarFrame,
        metric: &str,
        train_ratio: Option<f64>,
        analyze: F,
    ) -> Result<ValidationResult>
    where
        F: Fn(&BarFrame) -> anyhow::Result<O>,
        O: MetricSource,
    {
        let ratio = train_ratio.unwrap_or(self.settings.train_ratio);
        if ratio.is_nan() || ratio <= 0.0 || ratio >= 1.0 {
            return Err(AnalysisError::configuration(
                "train_ratio",
                format!("must be in (0, 1), got {ratio}"),
            ));
        }
        self.check_min_bars("out-of-sample validation", data)?;

        let len = data.len();
        let split = ((len as f64 * ratio).round() as usize).clamp(1, len - 1);
        let train = data.slice(0..split)?;
        let test = data.slice(split..len)?;

        let (train_value, train_metrics) = evaluate(&analyze, &train, metric)?;
        let (test_value, test_metrics) = evaluate(&analyze, &test, metric)?;
        let degradation = degradation_pct(train_value, test_value);
        let success = degradation.is_some_and(|d| d < self.settings.degradation_threshold_pct);

        let mut metadata = BTreeMap::new();
        metadata.insert("split_index".to_string(), Value::from(split));
        metadata.insert("train_ratio".to_string(), Value::from(ratio));
        metadata.insert("train_bars".to_string(), Value::from(train.len()));
        metadata.insert("test_bars".to_string(), Value::from(test.len()));
        metadata.insert("train_value".to_string(), Value::from(train_value));
        metadata.insert("test_value".to_string(), Value::from(test_value));
        metadata.insert(
            "threshold_pct".to_string(),
            Value::from(self.settings.degradation_threshold_pct),
        );
        insert_span(&mut metadata, "train", &train);
        insert_span(&mut metadata, "test", &test);

        info!(
            metric,
            split,
            train_value,
            test_value,
            degradation = ?degradation,
            success,
            "Out-of-sample validation complete"
        );

        Ok(ValidationResult {
            validation_type: ValidationType::OutOfSample,
            success,
            metric: metric.to_string(),
            train_metrics,
            test_metrics,
            degradation_pct: degradation,
            iterations: None,
            metadata,
        })
    }

    /// Re-runs `analyze` on every walk-forward window in chronological order.
    ///
    /// Success needs a stable test metric (stability at least `min_stability`)
    /// and a mean per-window degradation under the threshold.
    ///
    /// # Errors
    /// Returns [`AnalysisError::Configuration`] for zero window sizes, a
    /// missing metric or cancellation, [`AnalysisError::InsufficientData`]
    /// when no full window fits, and any error raised by `analyze`.
    pub fn walk_forward<F, O>(
        &self,
        data: &BarFrame,
        metric: &str,
        config: &WalkForwardConfig,
        analyze: F,
    ) -> Result<ValidationResult>
    where
        F: Fn(&BarFrame) -> anyhow::Result<O>,
        O: MetricSource,
    {
        config.validate()?;
        self.check_min_bars("walk-forward validation", data)?;
        let windows = config.windows(data.len());
        if windows.is_empty() {
            return Err(AnalysisError::insufficient(
                "walk-forward windows",
                config.train_bars + config.test_bars,
                data.len(),
            ));
        }

        let index = data.index();
        let mut steps = Vec::with_capacity(windows.len());
        for (iteration, (train_range, test_range)) in windows.into_iter().enumerate() {
            self.check_cancelled()?;
            let train = data.slice(train_range.clone())?;
            let test = data.slice(test_range.clone())?;
            let (train_metric, _) = evaluate(&analyze, &train, metric)?;
            let (test_metric, _) = evaluate(&analyze, &test, metric)?;
            let step = WindowResult {
                iteration,
                train_range: (train_range.start, train_range.end),
                test_range: (test_range.start, test_range.end),
                train_start: index[train_range.start],
                train_end: index[train_range.end - 1],
                test_start: index[test_range.start],
                test_end: index[test_range.end - 1],
                train_metric,
                test_metric,
                degradation_pct: degradation_pct(train_metric, test_metric),
            };
            debug!(
                iteration,
                train_metric,
                test_metric,
                degradation = ?step.degradation_pct,
                "Walk-forward window evaluated"
            );
            steps.push(step);
        }

        let train_values: Vec<f64> = steps.iter().map(|s| s.train_metric).collect();
        let test_values: Vec<f64> = steps.iter().map(|s| s.test_metric).collect();
        let degradations: Vec<f64> = steps.iter().filter_map(|s| s.degradation_pct).collect();
        let mean_degradation = mean(&degradations);
        let stability = stability_score(&test_values);
        let success = stability >= self.settings.min_stability
            && mean_degradation.is_some_and(|d| d < self.settings.degradation_threshold_pct);

        let mut metadata = BTreeMap::new();
        metadata.insert("stability".to_string(), Value::from(stability));
        metadata.insert("config".to_string(), config.to_dict());
        metadata.insert(
            "undefined_degradations".to_string(),
            Value::from(steps.len() - degradations.len()),
        );
        metadata.insert(
            "windows".to_string(),
            Value::Array(steps.iter().map(DictRecord::to_dict).collect()),
        );

        info!(
            metric,
            windows = steps.len(),
            stability,
            mean_degradation = ?mean_degradation,
            success,
            "Walk-forward validation complete"
        );

        Ok(ValidationResult {
            validation_type: ValidationType::WalkForward,
            success,
            metric: metric.to_string(),
            train_metrics: summary_metrics(&train_values),
            test_metrics: summary_metrics(&test_values),
            degradation_pct: mean_degradation,
            iterations: Some(steps.len()),
            metadata,
        })
    }

    /// Evaluates every combination of `grid` on the full data.
    ///
    /// Success means the metric is stable across combinations.
    ///
    /// # Errors
    /// Returns [`AnalysisError::Configuration`] for an empty grid or
    /// cancellation, and [`AnalysisError::InsufficientData`] below `min_bars`
    /// or when fewer than two combinations succeed.
    pub fn sensitivity<F, O>(
        &self,
        data: &BarFrame,
        metric: &str,
        grid: &ParameterGrid,
        analyze: F,
    ) -> Result<ValidationResult>
    where
        F: Fn(&BarFrame, &ParameterSet) -> anyhow::Result<O> + Sync,
        O: MetricSource,
    {
        self.check_min_bars("sensitivity analysis", data)?;
        let combos = parameter_combinations(grid)?;
        debug!(combinations = combos.len(), "Running sensitivity sweep");

        let outcomes = self.run_batch(&combos, |params| {
            self.check_cancelled()?;
            evaluate(&|frame: &BarFrame| analyze(frame, params), data, metric).map(|(v, _)| v)
        });
        self.check_cancelled()?;

        let mut rows = Vec::with_capacity(combos.len());
        let mut scored: Vec<(&ParameterSet, f64)> = Vec::new();
        for (params, outcome) in combos.iter().zip(outcomes) {
            match outcome {
                Ok(value) => {
                    scored.push((params, value));
                    rows.push(serde_json::json!({ "params": params, "metric": value }));
                }
                Err(e) => {
                    warn!(params = ?params, error = %e, "Sensitivity combination failed");
                    rows.push(serde_json::json!({ "params": params, "error": e.to_string() }));
                }
            }
        }
        if scored.len() < MIN_SUCCESSES {
            return Err(AnalysisError::insufficient(
                "sensitivity analysis successful combinations",
                MIN_SUCCESSES,
                scored.len(),
            ));
        }

        let values: Vec<f64> = scored.iter().map(|(_, v)| *v).collect();
        let stability = stability_score(&values);
        let success = stability >= self.settings.min_stability;
        // first combination wins ties
        let best = scored
            .iter()
            .fold(scored[0], |acc, cur| if cur.1 > acc.1 { *cur } else { acc });
        let worst = scored
            .iter()
            .fold(scored[0], |acc, cur| if cur.1 < acc.1 { *cur } else { acc });

        let mut metadata = BTreeMap::new();
        metadata.insert("stability".to_string(), Value::from(stability));
        metadata.insert("best_params".to_string(), params_value(best.0));
        metadata.insert("best_metric".to_string(), Value::from(best.1));
        metadata.insert("worst_params".to_string(), params_value(worst.0));
        metadata.insert("worst_metric".to_string(), Value::from(worst.1));
        metadata.insert("failed".to_string(), Value::from(combos.len() - scored.len()));
        metadata.insert("combinations".to_string(), Value::Array(rows));

        info!(
            metric,
            combinations = combos.len(),
            failed = combos.len() - scored.len(),
            stability,
            success,
            "Sensitivity analysis complete"
        );

        Ok(ValidationResult {
            validation_type: ValidationType::Sensitivity,
            success,
            metric: metric.to_string(),
            train_metrics: BTreeMap::new(),
            test_metrics: summary_metrics(&values),
            degradation_pct: None,
            iterations: Some(combos.len()),
            metadata,
        })
    }

    /// Compares the real metric with its distribution over synthetic series.
    ///
    /// Simulation `i` is seeded with `seed + i`, so results do not depend on
    /// scheduling. Success means the real metric is above the `confidence`
    /// percentile of the synthetic metrics.
    ///
    /// Return-based methods hand `analyze` frames without extra columns, so
    /// `analyze` must compute its indicators from prices rather than read
    /// them from the source frame.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] when `n_simulations` is
    /// below `min_simulations`, the data is below `min_bars` or fewer than two
    /// simulations succeed; [`AnalysisError::Configuration`] on cancellation or
    /// a missing metric; and any error `analyze` raises on the real data.
    pub fn monte_carlo<F, O>(
        &self,
        data: &BarFrame,
        metric: &str,
        method: ShuffleMethod,
        analyze: F,
    ) -> Result<ValidationResult>
    where
        F: Fn(&BarFrame) -> anyhow::Result<O> + Sync,
        O: MetricSource,
    {
        let n_simulations = self.settings.n_simulations;
        if n_simulations < self.settings.min_simulations {
            return Err(AnalysisError::insufficient(
                "monte carlo simulations",
                self.settings.min_simulations,
                n_simulations,
            ));
        }
        self.check_min_bars("monte carlo validation", data)?;
        let confidence = self.settings.confidence;
        if confidence.is_nan() || confidence <= 0.0 || confidence >= 1.0 {
            return Err(AnalysisError::configuration(
                "confidence",
                format!("must be in (0, 1), got {confidence}"),
            ));
        }

        let (real, real_metrics) = evaluate(&analyze, data, metric)?;

        let seeds: Vec<u64> = (0..n_simulations as u64)
            .map(|i| self.settings.seed.wrapping_add(i))
            .collect();
        let outcomes = self.run_batch(&seeds, |seed| {
            self.check_cancelled()?;
            let synthetic = synthesize(data, method, *seed)?;
            evaluate(&analyze, &synthetic, metric).map(|(v, _)| v)
        });
        self.check_cancelled()?;

        let mut values = Vec::with_capacity(n_simulations);
        for (seed, outcome) in seeds.iter().zip(outcomes) {
            match outcome {
                Ok(value) => values.push(value),
                Err(e) => warn!(seed, error = %e, "Monte Carlo simulation failed"),
            }
        }
        if values.len() < MIN_SUCCESSES {
            return Err(AnalysisError::insufficient(
                "monte carlo successful simulations",
                MIN_SUCCESSES,
                values.len(),
            ));
        }

        let synthetic_mean = mean(&values).unwrap_or(0.0);
        let synthetic_std = sample_std(&values).unwrap_or(0.0);
        let z_score = (synthetic_std > 0.0).then(|| (real - synthetic_mean) / synthetic_std);
        let rank = percentile_rank(&values, real);
        let threshold = percentile(&values, confidence * 100.0).unwrap_or(f64::INFINITY);
        let success = real > threshold;

        let mut metadata = BTreeMap::new();
        metadata.insert("method".to_string(), Value::from(method.as_str()));
        metadata.insert("real_metric".to_string(), Value::from(real));
        metadata.insert("synthetic_mean".to_string(), Value::from(synthetic_mean));
        metadata.insert("synthetic_std".to_string(), Value::from(synthetic_std));
        metadata.insert("z_score".to_string(), z_score.map_or(Value::Null, Value::from));
        metadata.insert("percentile_rank".to_string(), Value::from(rank));
        metadata.insert("threshold".to_string(), Value::from(threshold));
        metadata.insert("confidence".to_string(), Value::from(confidence));
        metadata.insert("seed".to_string(), Value::from(self.settings.seed));
        metadata.insert("failed".to_string(), Value::from(n_simulations - values.len()));

        info!(
            metric,
            method = %method,
            simulations = n_simulations,
            real,
            threshold,
            z_score = ?z_score,
            success,
            "Monte Carlo validation complete"
        );

        Ok(ValidationResult {
            validation_type: ValidationType::MonteCarlo,
            success,
            metric: metric.to_string(),
            train_metrics: real_metrics,
            test_metrics: summary_metrics(&values),
            degradation_pct: None,
            iterations: Some(n_simulations),
            metadata,
        })
    }
}

/// Runs `analyze` once and reads `metric` from its output.
fn evaluate<F, O>(
    analyze: &F,
    data: &BarFrame,
    metric: &str,
) -> Result<(f64, BTreeMap<String, f64>)>
where
    F: Fn(&BarFrame) -> anyhow::Result<O>,
    O: MetricSource,
{
    let output = analyze(data)?;
    let mut metrics = output.metrics();
    let value = output.metric(metric).ok_or_else(|| {
        AnalysisError::configuration(
            "metric",
            format!(
                "analysis output has no finite '{metric}' (available: {})",
                metrics.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        )
    })?;
    metrics.insert(metric.to_string(), value);
    Ok((value, metrics))
}

fn insert_span(metadata: &mut BTreeMap<String, Value>, prefix: &str, frame: &BarFrame) {
    for (suffix, ts) in [("start", frame.first_timestamp()), ("end", frame.last_timestamp())] {
        let value = ts.map_or(Value::Null, |t| Value::from(t.to_rfc3339()));
        metadata.insert(format!("{prefix}_{suffix}"), value);
    }
}

fn params_value(params: &ParameterSet) -> Value {
    Value::Object(params.clone().into_iter().collect())
}
