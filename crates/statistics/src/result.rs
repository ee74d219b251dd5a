//! Uniform output of every hypothesis test.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::stats::finite_or_max;

/// Outcome of one statistical test.
///
/// `significant` is `p_value < alpha` for the alpha the test ran with.
/// Test-specific detail (group means and sizes, critical values, detected
/// price levels, ...) goes into `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisTestResult {
    /// Registered test name, e.g. `stationarity`.
    pub test_name: String,
    /// Null hypothesis in words.
    pub hypothesis: String,
    pub statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    /// Cohen's d, rank-biserial correlation or Pearson r, depending on the test.
    pub effect_size: Option<f64>,
    pub metadata: BTreeMap<String, Value>,
}

impl HypothesisTestResult {
    /// Creates a result; non-finite statistics are clamped so the record stays serializable.
    #[must_use]
    pub fn new(
        test_name: impl Into<String>,
        hypothesis: impl Into<String>,
        statistic: f64,
        p_value: f64,
        alpha: f64,
    ) -> Self {
        let p_value = if p_value.is_nan() { 1.0 } else { p_value.clamp(0.0, 1.0) };
        Self {
            test_name: test_name.into(),
            hypothesis: hypothesis.into(),
            statistic: finite_or_max(statistic),
            p_value,
            significant: p_value < alpha,
            effect_size: None,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_effect_size(mut self, effect_size: Option<f64>) -> Self {
        self.effect_size = effect_size.filter(|v| v.is_finite());
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Summary returned by [`crate::HypothesisTestSuite::run_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisSummary {
    /// Number of tests that produced a result.
    pub total: usize,
    /// Number of results with `p_value < alpha`.
    pub significant: usize,
    /// Tests skipped for lack of data, with the reason.
    pub skipped: BTreeMap<String, String>,
    pub results: Vec<HypothesisTestResult>,
}

impl HypothesisSummary {
    /// Looks up a result by test name.
    #[must_use]
    pub fn get(&self, test_name: &str) -> Option<&HypothesisTestResult> {
        self.results.iter().find(|r| r.test_name == test_name)
    }
}
