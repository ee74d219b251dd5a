//! Declarative configuration for the analysis pipeline.
//!
//! The configuration names one strategy per metric family together with its
//! parameters, the column names of the driving indicator, and the global
//! knobs of the statistical layers. File formats are handled by
//! [`crate::config_loader::ConfigLoader`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AnalysisError, Result};

/// Strategy parameters as a JSON object, decoded by each strategy.
pub type StrategyParams = Map<String, Value>;

/// Which strategy to use for one metric family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySelection {
    /// Registered strategy name.
    pub name: String,
    /// Strategy-specific parameters; omitted keys take the strategy defaults.
    #[serde(default)]
    pub params: StrategyParams,
}

impl StrategySelection {
    /// Selects a strategy with default parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: StrategyParams::new(),
        }
    }

    /// Adds one parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Per-family strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub swing: StrategySelection,
    pub shape: StrategySelection,
    pub divergence: StrategySelection,
    pub volatility: StrategySelection,
    pub volume: StrategySelection,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            swing: StrategySelection::new("zigzag"),
            shape: StrategySelection::new("moments"),
            divergence: StrategySelection::new("extrema_pairs"),
            volatility: StrategySelection::new("bands_range"),
            volume: StrategySelection::new("baseline"),
        }
    }
}

/// Names of the indicator columns inside each zone's bar table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// The sign-oscillating indicator that defines zones.
    pub indicator: String,
    /// Its signal/histogram derivative.
    pub signal: String,
    /// Volume column (optional in the data).
    pub volume: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            indicator: "macd".to_string(),
            signal: "macd_hist".to_string(),
            volume: "volume".to_string(),
        }
    }
}

impl ColumnConfig {
    /// Creates a column mapping for an arbitrary oscillator.
    #[must_use]
    pub fn new(indicator: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            indicator: indicator.into(),
            signal: signal.into(),
            ..Self::default()
        }
    }
}

/// Knobs of the hypothesis test battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypothesisSettings {
    /// Zones with price/indicator correlation above this are "high".
    pub high_correlation: f64,
    /// Zones with price/indicator correlation below this are "low".
    pub low_correlation: f64,
    /// Clustering tolerance for auto-identified price levels, in percent.
    pub level_tolerance_pct: f64,
    /// Distance to a level below which a zone counts as "near", in percent.
    pub proximity_tolerance_pct: f64,
    /// Minimum touches for a price cluster to become a level.
    pub min_touches: usize,
    /// Metric compared between positive and negative zones.
    pub asymmetry_metric: String,
}

impl Default for HypothesisSettings {
    fn default() -> Self {
        Self {
            high_correlation: 0.7,
            low_correlation: 0.3,
            level_tolerance_pct: 1.0,
            proximity_tolerance_pct: 0.5,
            min_touches: 2,
            asymmetry_metric: "return_pct".to_string(),
        }
    }
}

/// Knobs of the sequence and clustering analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    /// Feature names used for clustering when the caller passes none.
    pub cluster_features: Vec<String>,
    /// Seed for k-means initialisation.
    pub seed: u64,
    /// Iteration cap for k-means.
    pub max_iterations: usize,
    /// Length of searched zone-type n-grams.
    pub pattern_length: usize,
    /// Minimum repetitions for a pattern to be reported.
    pub min_occurrences: usize,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            cluster_features: vec![
                "duration".to_string(),
                "return_pct".to_string(),
                "amplitude".to_string(),
                "range_pct".to_string(),
            ],
            seed: 42,
            max_iterations: 300,
            pattern_length: 3,
            min_occurrences: 2,
        }
    }
}

/// Knobs of the validation suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Fraction of bars used for training in the out-of-sample split.
    pub train_ratio: f64,
    /// Maximum tolerated train-to-test degradation, in percent.
    pub degradation_threshold_pct: f64,
    /// Number of Monte Carlo simulations.
    pub n_simulations: usize,
    /// Minimum bars for any validation protocol.
    pub min_bars: usize,
    /// Minimum Monte Carlo simulations.
    pub min_simulations: usize,
    /// Base seed; simulation `i` uses `seed + i`.
    pub seed: u64,
    /// Percentile the real metric must exceed in Monte Carlo (0-1).
    pub confidence: f64,
    /// Minimum stability score for walk-forward/sensitivity success.
    pub min_stability: f64,
    /// Run Monte Carlo and sensitivity work on the rayon pool.
    pub parallel: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            degradation_threshold_pct: 20.0,
            n_simulations: 100,
            min_bars: 10,
            min_simulations: 10,
            seed: 42,
            confidence: 0.95,
            min_stability: 0.7,
            parallel: true,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub columns: ColumnConfig,
    pub strategies: FeatureConfig,
    /// Significance level of every hypothesis test.
    pub alpha: f64,
    /// Zones shorter than this are not admitted to extraction.
    pub min_duration: usize,
    /// Zones whose indicator amplitude is below this are not admitted.
    pub min_amplitude: f64,
    pub hypothesis: HypothesisSettings,
    pub sequence: SequenceSettings,
    pub validation: ValidationSettings,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            columns: ColumnConfig::default(),
            strategies: FeatureConfig::default(),
            alpha: 0.05,
            min_duration: 1,
            min_amplitude: 0.0,
            hypothesis: HypothesisSettings::default(),
            sequence: SequenceSettings::default(),
            validation: ValidationSettings::default(),
        }
    }
}

impl AnalysisConfig {
    /// Checks every knob and returns the first violation.
    ///
    /// # Errors
    /// Returns [`AnalysisError::Configuration`] naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        check_open_unit("alpha", self.alpha)?;
        check_open_unit("validation.train_ratio", self.validation.train_ratio)?;
        check_open_unit("validation.confidence", self.validation.confidence)?;

        for (name, value) in [
            ("columns.indicator", &self.columns.indicator),
            ("columns.signal", &self.columns.signal),
            ("columns.volume", &self.columns.volume),
        ] {
            if value.trim().is_empty() {
                return Err(AnalysisError::configuration(name, "column name must not be empty"));
            }
        }

        for (family, selection) in [
            ("strategies.swing", &self.strategies.swing),
            ("strategies.shape", &self.strategies.shape),
            ("strategies.divergence", &self.strategies.divergence),
            ("strategies.volatility", &self.strategies.volatility),
            ("strategies.volume", &self.strategies.volume),
        ] {
            if selection.name.trim().is_empty() {
                return Err(AnalysisError::configuration(family, "strategy name must not be empty"));
            }
        }

        if self.min_duration == 0 {
            return Err(AnalysisError::configuration("min_duration", "must be >= 1"));
        }
        if !self.min_amplitude.is_finite() || self.min_amplitude < 0.0 {
            return Err(AnalysisError::configuration(
                "min_amplitude",
                format!("must be a finite value >= 0, got {}", self.min_amplitude),
            ));
        }

        let h = &self.hypothesis;
        if !(0.0..=1.0).contains(&h.low_correlation)
            || !(0.0..=1.0).contains(&h.high_correlation)
            || h.low_correlation >= h.high_correlation
        {
            return Err(AnalysisError::configuration(
                "hypothesis.low_correlation",
                format!(
                    "expected 0 <= low < high <= 1, got low={} high={}",
                    h.low_correlation, h.high_correlation
                ),
            ));
        }
        if h.level_tolerance_pct <= 0.0 || h.proximity_tolerance_pct <= 0.0 {
            return Err(AnalysisError::configuration(
                "hypothesis.level_tolerance_pct",
                "tolerances must be > 0",
            ));
        }
        if h.min_touches < 2 {
            return Err(AnalysisError::configuration("hypothesis.min_touches", "must be >= 2"));
        }

        let s = &self.sequence;
        if s.cluster_features.is_empty() {
            return Err(AnalysisError::configuration(
                "sequence.cluster_features",
                "at least one feature is required",
            ));
        }
        if s.pattern_length < 2 {
            return Err(AnalysisError::configuration("sequence.pattern_length", "must be >= 2"));
        }

        let v = &self.validation;
        if v.degradation_threshold_pct <= 0.0 {
            return Err(AnalysisError::configuration(
                "validation.degradation_threshold_pct",
                format!("must be > 0, got {}", v.degradation_threshold_pct),
            ));
        }
        if v.min_simulations == 0 || v.n_simulations < v.min_simulations {
            return Err(AnalysisError::configuration(
                "validation.n_simulations",
                format!(
                    "must be >= min_simulations ({}), got {}",
                    v.min_simulations, v.n_simulations
                ),
            ));
        }
        if v.min_bars < 2 {
            return Err(AnalysisError::configuration("validation.min_bars", "must be >= 2"));
        }

        Ok(())
    }
}

fn check_open_unit(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(AnalysisError::configuration(
            name,
            format!("must be in (0, 1), got {value}"),
        ))
    }
}
