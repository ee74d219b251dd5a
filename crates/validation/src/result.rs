//! Validation outcome records and the aggregate scores they report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::stats::{mean, sample_std};

const EPS: f64 = 1e-12;

/// Which protocol produced a [`ValidationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    OutOfSample,
    WalkForward,
    Sensitivity,
    MonteCarlo,
}

impl ValidationType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfSample => "out_of_sample",
            Self::WalkForward => "walk_forward",
            Self::Sensitivity => "sensitivity",
            Self::MonteCarlo => "monte_carlo",
        }
    }
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one validation protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validation_type: ValidationType,
    pub success: bool,
    /// Name of the validated metric.
    pub metric: String,
    pub train_metrics: BTreeMap<String, f64>,
    pub test_metrics: BTreeMap<String, f64>,
    /// Train-to-test degradation in percent; `None` when undefined.
    pub degradation_pct: Option<f64>,
    /// Windows, combinations or simulations evaluated.
    pub iterations: Option<usize>,
    pub metadata: BTreeMap<String, Value>,
}

/// One walk-forward step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub iteration: usize,
    /// Bar range `[start, end)` of the train window.
    pub train_range: (usize, usize),
    /// Bar range `[start, end)` of the test window.
    pub test_range: (usize, usize),
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
    pub train_metric: f64,
    pub test_metric: f64,
    pub degradation_pct: Option<f64>,
}

impl WindowResult {
    /// Train window ends strictly before the test window starts.
    #[must_use]
    pub fn is_chronological(&self) -> bool {
        self.train_range.1 <= self.test_range.0 && self.train_end < self.test_start
    }
}

/// Percentage drop from `train` to `test`, relative to `|train|`.
///
/// A zero train value gives 0 when the test value is also zero and `None`
/// otherwise.
#[must_use]
pub fn degradation_pct(train: f64, test: f64) -> Option<f64> {
    if train.abs() <= EPS {
        return (test.abs() <= EPS).then_some(0.0);
    }
    Some((train - test) / train.abs() * 100.0)
}

/// `1 - std / |mean|` clamped to [0, 1]; a zero mean scores 0.
///
/// Fewer than two values are trivially stable.
#[must_use]
pub fn stability_score(values: &[f64]) -> f64 {
    let Some(mu) = mean(values) else {
        return 0.0;
    };
    if mu.abs() <= EPS {
        return 0.0;
    }
    let Some(sd) = sample_std(values) else {
        return 1.0;
    };
    (1.0 - sd / mu.abs()).clamp(0.0, 1.0)
}

/// Mean, std, min and max of `values` as a metrics map.
pub(crate) fn summary_metrics(values: &[f64]) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    if let Some(mu) = mean(values) {
        out.insert("mean".to_string(), mu);
    }
    out.insert("std".to_string(), sample_std(values).unwrap_or(0.0));
    if let Some(min) = values.iter().copied().reduce(f64::min) {
        out.insert("min".to_string(), min);
    }
    if let Some(max) = values.iter().copied().reduce(f64::max) {
        out.insert("max".to_string(), max);
    }
    out
}
