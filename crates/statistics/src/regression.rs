//! OLS regression of zone duration or return on zone features.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zone_analysis_core::linalg::{design_with_intercept, ols};
use zone_analysis_core::stats::{f_upper_tail, finite_or_max, student_t_two_sided};
use zone_analysis_core::{AnalysisError, Result};
use zone_analysis_features::ZoneFeatureRecord;

/// Predictors used when the caller does not name any; the target is removed.
pub const DEFAULT_PREDICTORS: &[&str] = &[
    "duration",
    "amplitude",
    "range_pct",
    "peak_count",
    "time_to_peak_ratio",
    "return_pct",
];

const INTERCEPT: &str = "intercept";

/// Dependent variable of a regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionTarget {
    Duration,
    Return,
}

impl RegressionTarget {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::Return => "return",
        }
    }

    /// Record feature holding the target value.
    #[must_use]
    pub fn feature(self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::Return => "return_pct",
        }
    }
}

impl fmt::Display for RegressionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegressionTarget {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "duration" => Ok(Self::Duration),
            "return" | "return_pct" => Ok(Self::Return),
            other => Err(AnalysisError::configuration(
                "target",
                format!("expected 'duration' or 'return', got '{other}'"),
            )),
        }
    }
}

/// Fit diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionDiagnostics {
    /// Variance inflation factor per predictor.
    pub vif: BTreeMap<String, f64>,
    pub aic: f64,
    pub bic: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    /// Durbin-Watson statistic of the residuals (2 means no autocorrelation).
    pub durbin_watson: f64,
    pub condition_number: f64,
}

/// Output of [`RegressionAnalyzer::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub target: RegressionTarget,
    pub predictors: Vec<String>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    /// Coefficients keyed by predictor name plus `intercept`.
    pub coefficients: BTreeMap<String, f64>,
    pub standard_errors: BTreeMap<String, f64>,
    pub p_values: BTreeMap<String, f64>,
    pub predictions: Vec<f64>,
    pub residuals: Vec<f64>,
    pub n_obs: usize,
    pub n_predictors: usize,
    /// Zones dropped for missing target or predictor values.
    pub dropped: usize,
    pub diagnostics: RegressionDiagnostics,
}

impl RegressionResult {
    /// Predictors whose coefficient p-value is below `alpha`.
    #[must_use]
    pub fn significant_predictors(&self, alpha: f64) -> Vec<&str> {
        self.predictors
            .iter()
            .filter(|p| self.p_values.get(p.as_str()).is_some_and(|v| *v < alpha))
            .map(String::as_str)
            .collect()
    }
}

/// Fits ordinary least squares with an intercept.
#[derive(Debug, Clone, Default)]
pub struct RegressionAnalyzer {
    default_predictors: Option<Vec<String>>,
}

impl RegressionAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces [`DEFAULT_PREDICTORS`].
    #[must_use]
    pub fn with_default_predictors(mut self, predictors: Vec<String>) -> Self {
        self.default_predictors = Some(predictors);
        self
    }

    /// Regresses `target` on `predictors` (or the defaults) over `zones`.
    ///
    /// Zones missing the target or any predictor are dropped.
    ///
    /// # Errors
    /// - [`AnalysisError::Configuration`] when no predictor is given or a
    ///   predictor is absent from every zone.
    /// - [`AnalysisError::ModelFit`] when the observations do not exceed
    ///   `predictors + 1` or the design is singular.
    pub fn fit(
        &self,
        target: RegressionTarget,
        zones: &[ZoneFeatureRecord],
        predictors: Option<&[&str]>,
    ) -> Result<RegressionResult> {
        let names = self.predictor_names(target, predictors);
        if names.is_empty() {
            return Err(AnalysisError::configuration(
                "predictors",
                "at least one predictor is required",
            ));
        }
        for name in &names {
            if zones.iter().all(|z| z.numeric_feature(name).is_none()) {
                return Err(AnalysisError::configuration(
                    "predictors",
                    format!("'{name}' is absent from every zone"),
                ));
            }
        }

        let mut rows = Vec::with_capacity(zones.len());
        let mut y = Vec::with_capacity(zones.len());
        for zone in zones {
            let Some(target_value) = zone.numeric_feature(target.feature()) else {
                continue;
            };
            let row: Option<Vec<f64>> = names.iter().map(|n| zone.numeric_feature(n)).collect();
            if let Some(row) = row {
                rows.push(row);
                y.push(target_value);
            }
        }
        let dropped = zones.len() - rows.len();

        let n = rows.len();
        let p = names.len();
        if n <= p + 1 {
            return Err(AnalysisError::ModelFit(format!(
                "{n} usable observations for {p} predictors; need more than {}",
                p + 1
            )));
        }

        let x = design_with_intercept(&rows);
        let fit = ols(&x, &DVector::from_vec(y))?;

        let labels: Vec<String> = std::iter::once(INTERCEPT.to_string())
            .chain(names.iter().cloned())
            .collect();
        let df_resid = fit.df_resid() as f64;
        let t_values = fit.t_values();

        let coefficients = labels.iter().cloned().zip(fit.coefficients.iter().copied()).collect();
        let standard_errors = labels
            .iter()
            .cloned()
            .zip(fit.standard_errors.iter().copied())
            .collect();
        let p_values = labels
            .iter()
            .cloned()
            .zip(t_values.iter().map(|t| student_t_two_sided(*t, df_resid)))
            .collect();

        let r_squared = fit.r_squared();
        let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid;
        let (f_statistic, f_p_value) = if r_squared >= 1.0 - f64::EPSILON {
            (f64::MAX, 0.0)
        } else {
            let f = (r_squared / p as f64) / ((1.0 - r_squared) / df_resid);
            (f, f_upper_tail(f, p as f64, df_resid))
        };

        let residuals: Vec<f64> = fit.residuals.iter().copied().collect();
        let diagnostics = RegressionDiagnostics {
            vif: variance_inflation(&names, &rows),
            aic: finite_or_max(fit.aic()),
            bic: finite_or_max(fit.bic()),
            f_statistic,
            f_p_value,
            durbin_watson: durbin_watson(&residuals),
            condition_number: finite_or_max(fit.condition_number),
        };

        info!(
            target = %target,
            n_obs = n,
            n_predictors = p,
            dropped,
            r_squared,
            "Regression fitted"
        );

        Ok(RegressionResult {
            target,
            predictors: names,
            r_squared,
            adj_r_squared,
            coefficients,
            standard_errors,
            p_values,
            predictions: fit.fitted.iter().copied().collect(),
            residuals,
            n_obs: n,
            n_predictors: p,
            dropped,
            diagnostics,
        })
    }

    fn predictor_names(&self, target: RegressionTarget, predictors: Option<&[&str]>) -> Vec<String> {
        match predictors {
            Some(names) => names.iter().map(|s| (*s).to_string()).collect(),
            None => {
                let defaults: Vec<String> = match &self.default_predictors {
                    Some(names) => names.clone(),
                    None => DEFAULT_PREDICTORS.iter().map(|s| (*s).to_string()).collect(),
                };
                defaults
                    .into_iter()
                    .filter(|n| n != target.feature())
                    .collect()
            }
        }
    }
}

/// VIF of each predictor from regressing it on the others.
///
/// A single predictor has VIF 1; perfect collinearity is reported as `f64::MAX`.
fn variance_inflation(names: &[String], rows: &[Vec<f64>]) -> BTreeMap<String, f64> {
    let p = names.len();
    names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            if p == 1 {
                return (name.clone(), 1.0);
            }
            let others: Vec<Vec<f64>> = rows
                .iter()
                .map(|r| {
                    r.iter()
                        .enumerate()
                        .filter(|(k, _)| *k != j)
                        .map(|(_, v)| *v)
                        .collect()
                })
                .collect();
            let target = DVector::from_iterator(rows.len(), rows.iter().map(|r| r[j]));
            let vif = match ols(&design_with_intercept(&others), &target) {
                Ok(fit) => {
                    let r2 = fit.r_squared();
                    if r2 >= 1.0 - f64::EPSILON {
                        f64::MAX
                    } else {
                        1.0 / (1.0 - r2)
                    }
                }
                Err(e) => {
                    debug!(predictor = %name, error = %e, "VIF regression failed");
                    f64::MAX
                }
            };
            (name.clone(), vif)
        })
        .collect()
}

fn durbin_watson(residuals: &[f64]) -> f64 {
    let ssr: f64 = residuals.iter().map(|e| e * e).sum();
    if ssr <= f64::EPSILON {
        return 0.0;
    }
    let num: f64 = residuals.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    num / ssr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use zone_analysis_core::{DictRecord, ZoneType};

    fn zones(n: usize) -> Vec<ZoneFeatureRecord> {
        (0..n)
            .map(|i| {
                let duration = 3 + i % 17;
                let mut r = record(i, ZoneType::Positive, duration, 0.1 * i as f64);
                r.amplitude = 0.5 * duration as f64 + 0.3 * ((i as f64) * 1.3).sin();
                r.range_pct = 1.0 + ((i as f64) * 0.7).cos();
                r
            })
            .collect()
    }

    #[test]
    fn amplitude_explains_duration() {
        let zones = zones(50);
        let result = RegressionAnalyzer::new()
            .fit(RegressionTarget::Duration, &zones, Some(&["amplitude", "range_pct"][..]))
            .unwrap();
        assert!(result.r_squared > 0.5);
        assert!(result.p_values["amplitude"] < 0.05);
        assert!(result.coefficients["amplitude"] > 0.0);
        assert_eq!(result.n_obs, 50);
        assert_eq!(result.predictions.len(), 50);
        assert!(result.adj_r_squared <= result.r_squared);
        assert!(result.significant_predictors(0.05).contains(&"amplitude"));
        assert!(result.diagnostics.vif["amplitude"] >= 1.0);
        assert!((0.0..=4.0).contains(&result.diagnostics.durbin_watson));
    }

    #[test]
    fn underdetermined_fit_is_rejected() {
        let err = RegressionAnalyzer::new()
            .fit(RegressionTarget::Duration, &zones(3), Some(&["amplitude", "range_pct"][..]))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ModelFit(_)));
        assert!(err.to_string().contains("need more than 3"));
    }

    #[test]
    fn absent_predictor_is_a_configuration_error() {
        let err = RegressionAnalyzer::new()
            .fit(RegressionTarget::Return, &zones(20), Some(&["swing.rally_count"][..]))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration { .. }));
        assert!(err.to_string().contains("swing.rally_count"));
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let mut zones = zones(30);
        for z in zones.iter_mut().take(5) {
            z.drawdown_pct = None;
        }
        for z in zones.iter_mut().skip(5) {
            z.drawdown_pct = Some(z.duration as f64 * 0.2);
        }
        let result = RegressionAnalyzer::new()
            .fit(RegressionTarget::Return, &zones, Some(&["drawdown_pct", "amplitude"][..]))
            .unwrap();
        assert_eq!(result.dropped, 5);
        assert_eq!(result.n_obs, 25);
    }

    #[test]
    fn default_predictors_exclude_target() {
        let analyzer = RegressionAnalyzer::new();
        let names = analyzer.predictor_names(RegressionTarget::Duration, None);
        assert!(!names.contains(&"duration".to_string()));
        let names = analyzer.predictor_names(RegressionTarget::Return, None);
        assert!(!names.contains(&"return_pct".to_string()));
        assert!(names.contains(&"duration".to_string()));
    }

    #[test]
    fn target_parses_from_str() {
        assert_eq!("return".parse::<RegressionTarget>().unwrap(), RegressionTarget::Return);
        assert!("volume".parse::<RegressionTarget>().is_err());
    }

    #[test]
    fn result_round_trips() {
        let result = RegressionAnalyzer::new()
            .fit(RegressionTarget::Duration, &zones(40), Some(&["amplitude"][..]))
            .unwrap();
        assert_eq!(result.diagnostics.vif["amplitude"], 1.0);
        let back = RegressionResult::from_dict(result.to_dict()).unwrap();
        assert_eq!(back, result);
    }
}
