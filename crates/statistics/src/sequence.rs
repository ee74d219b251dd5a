//! Zone-type sequences: transitions, streak randomness, repeated patterns, clustering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zone_analysis_core::stats::{mean, median, normal_two_sided};
use zone_analysis_core::{AnalysisConfig, AnalysisError, Result, SequenceSettings, ZoneType};
use zone_analysis_features::ZoneFeatureRecord;

use crate::clustering::{silhouette_score, standardize, KMeans};
use crate::result::HypothesisTestResult;

const ZONE_TYPES: [ZoneType; 2] = [ZoneType::Positive, ZoneType::Negative];

/// Empirical transition frequencies between consecutive zone types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTable {
    /// `counts[from][to]`, keyed by zone type name.
    pub counts: BTreeMap<String, BTreeMap<String, usize>>,
    /// Row-normalised counts; rows without transitions are all zero.
    pub probabilities: BTreeMap<String, BTreeMap<String, f64>>,
    pub total_transitions: usize,
}

impl TransitionTable {
    #[must_use]
    pub fn probability(&self, from: ZoneType, to: ZoneType) -> f64 {
        self.probabilities
            .get(from.as_str())
            .and_then(|row| row.get(to.as_str()))
            .copied()
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn count(&self, from: ZoneType, to: ZoneType) -> usize {
        self.counts
            .get(from.as_str())
            .and_then(|row| row.get(to.as_str()))
            .copied()
            .unwrap_or(0)
    }
}

/// Symbols used by pattern search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternAlphabet {
    /// Zone type only.
    #[default]
    Type,
    /// Zone type and whether the duration exceeds the median (`positive_long`).
    TypeDuration,
}

/// A repeated n-gram of zone symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePattern {
    pub symbols: Vec<String>,
    pub occurrences: usize,
    /// Occurrences over the number of n-gram windows.
    pub frequency: f64,
}

/// Summary of one k-means cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub mean_duration: Option<f64>,
    pub mean_return_pct: Option<f64>,
    /// Majority zone type; ties go to positive.
    pub dominant_type: Option<ZoneType>,
    /// Mean of each clustering feature in its original units.
    pub centroid: BTreeMap<String, f64>,
}

/// Output of [`SequenceAnalyzer::cluster`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAnalysis {
    pub k: usize,
    pub features: Vec<String>,
    /// `(zone id, cluster)` for every clustered zone.
    pub assignments: Vec<(usize, usize)>,
    pub clusters: Vec<ClusterSummary>,
    /// Mean silhouette on standardised features; `None` when undefined.
    pub silhouette: Option<f64>,
    pub inertia: f64,
    /// Zones skipped for missing feature values.
    pub dropped: usize,
}

/// Sequence and clustering analysis over ordered zone records.
#[derive(Debug, Clone)]
pub struct SequenceAnalyzer {
    alpha: f64,
    settings: SequenceSettings,
}

impl Default for SequenceAnalyzer {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            settings: SequenceSettings::default(),
        }
    }
}

impl SequenceAnalyzer {
    #[must_use]
    pub fn new(alpha: f64, settings: SequenceSettings) -> Self {
        Self { alpha, settings }
    }

    /// # Errors
    /// Returns the first validation error of `config`.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.alpha, config.sequence.clone()))
    }

    #[must_use]
    pub fn settings(&self) -> &SequenceSettings {
        &self.settings
    }

    /// Counts type-to-type transitions in the given order.
    #[must_use]
    pub fn transitions(&self, zones: &[ZoneFeatureRecord]) -> TransitionTable {
        let mut counts: BTreeMap<String, BTreeMap<String, usize>> = ZONE_TYPES
            .iter()
            .map(|from| {
                let row = ZONE_TYPES.iter().map(|to| (to.as_str().to_string(), 0)).collect();
                (from.as_str().to_string(), row)
            })
            .collect();

        for pair in zones.windows(2) {
            if let Some(cell) = counts
                .get_mut(pair[0].zone_type.as_str())
                .and_then(|row| row.get_mut(pair[1].zone_type.as_str()))
            {
                *cell += 1;
            }
        }

        let probabilities = counts
            .iter()
            .map(|(from, row)| {
                let total: usize = row.values().sum();
                let probs = row
                    .iter()
                    .map(|(to, c)| {
                        let p = if total == 0 { 0.0 } else { *c as f64 / total as f64 };
                        (to.clone(), p)
                    })
                    .collect();
                (from.clone(), probs)
            })
            .collect();

        TransitionTable {
            counts,
            probabilities,
            total_transitions: zones.len().saturating_sub(1),
        }
    }

    /// Wald-Wolfowitz runs test on the zone-type sequence.
    ///
    /// Significant results mean the streaks are not random: fewer runs than
    /// expected (negative statistic) indicate clustering of same-type zones.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] unless both zone types occur.
    pub fn runs_test(&self, zones: &[ZoneFeatureRecord]) -> Result<HypothesisTestResult> {
        let n1 = zones.iter().filter(|z| z.zone_type == ZoneType::Positive).count();
        let n2 = zones.len() - n1;
        if n1 == 0 || n2 == 0 {
            return Err(AnalysisError::insufficient(
                "runs test (zones of each type)",
                1,
                n1.min(n2),
            ));
        }

        let runs = 1 + zones
            .windows(2)
            .filter(|w| w[0].zone_type != w[1].zone_type)
            .count();
        let (n1f, n2f) = (n1 as f64, n2 as f64);
        let n = n1f + n2f;
        let expected = 2.0 * n1f * n2f / n + 1.0;
        let variance = 2.0 * n1f * n2f * (2.0 * n1f * n2f - n) / (n * n * (n - 1.0));
        let (z, p) = if variance > 0.0 {
            let z = (runs as f64 - expected) / variance.sqrt();
            (z, normal_two_sided(z))
        } else {
            (0.0, 1.0)
        };

        Ok(HypothesisTestResult::new(
            "runs_test",
            "the zone-type sequence is random",
            z,
            p,
            self.alpha,
        )
        .with_meta("runs", runs)
        .with_meta("expected_runs", expected)
        .with_meta("n_positive", n1)
        .with_meta("n_negative", n2))
    }

    /// Finds n-grams of length `settings.pattern_length` that occur at least
    /// `settings.min_occurrences` times, most frequent first.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InsufficientData`] when there are fewer zones
    /// than the pattern length.
    pub fn patterns(
        &self,
        zones: &[ZoneFeatureRecord],
        alphabet: PatternAlphabet,
    ) -> Result<Vec<SequencePattern>> {
        let length = self.settings.pattern_length;
        if length == 0 || zones.len() < length {
            return Err(AnalysisError::insufficient(
                "pattern search",
                length.max(1),
                zones.len(),
            ));
        }

        let durations: Vec<f64> = zones.iter().map(|z| z.duration as f64).collect();
        let split = median(&durations).unwrap_or(0.0);
        let symbols: Vec<String> = zones
            .iter()
            .map(|z| match alphabet {
                PatternAlphabet::Type => z.zone_type.as_str().to_string(),
                PatternAlphabet::TypeDuration => {
                    let class = if z.duration as f64 > split { "long" } else { "short" };
                    format!("{}_{class}", z.zone_type.as_str())
                }
            })
            .collect();

        let mut counts: BTreeMap<Vec<String>, usize> = BTreeMap::new();
        for window in symbols.windows(length) {
            *counts.entry(window.to_vec()).or_default() += 1;
        }
        let windows = symbols.len() - length + 1;

        let mut found: Vec<SequencePattern> = counts
            .into_iter()
            .filter(|(_, c)| *c >= self.settings.min_occurrences)
            .map(|(symbols, occurrences)| SequencePattern {
                symbols,
                occurrences,
                frequency: occurrences as f64 / windows as f64,
            })
            .collect();
        found.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.symbols.cmp(&b.symbols)));
        debug!(length, patterns = found.len(), "Pattern search complete");
        Ok(found)
    }

    /// K-Means over standardised `features` (or `settings.cluster_features`).
    ///
    /// # Errors
    /// - [`AnalysisError::Configuration`] for `k == 0`, an empty feature list
    ///   or a feature absent from every zone.
    /// - [`AnalysisError::InsufficientData`] when fewer zones than `k` have
    ///   every feature.
    pub fn cluster(
        &self,
        zones: &[ZoneFeatureRecord],
        k: usize,
        features: Option<&[&str]>,
    ) -> Result<ClusterAnalysis> {
        let features: Vec<String> = match features {
            Some(names) => names.iter().map(|s| (*s).to_string()).collect(),
            None => self.settings.cluster_features.clone(),
        };
        if features.is_empty() {
            return Err(AnalysisError::configuration(
                "features",
                "at least one clustering feature is required",
            ));
        }
        for name in &features {
            if zones.iter().all(|z| z.numeric_feature(name).is_none()) {
                return Err(AnalysisError::configuration(
                    "features",
                    format!("'{name}' is absent from every zone"),
                ));
            }
        }

        let mut members: Vec<&ZoneFeatureRecord> = Vec::with_capacity(zones.len());
        let mut raw: Vec<Vec<f64>> = Vec::with_capacity(zones.len());
        for zone in zones {
            let row: Option<Vec<f64>> = features.iter().map(|f| zone.numeric_feature(f)).collect();
            if let Some(row) = row {
                members.push(zone);
                raw.push(row);
            }
        }
        let dropped = zones.len() - members.len();

        let scaled = standardize(&raw);
        let fit = KMeans::new(k, self.settings.seed)
            .with_max_iterations(self.settings.max_iterations)
            .fit(&scaled)?;
        let silhouette = silhouette_score(&scaled, &fit.labels);

        let clusters: Vec<ClusterSummary> = (0..k)
            .map(|c| {
                let idx: Vec<usize> = (0..members.len()).filter(|i| fit.labels[*i] == c).collect();
                let durations: Vec<f64> = idx.iter().map(|i| members[*i].duration as f64).collect();
                let returns: Vec<f64> = idx.iter().map(|i| members[*i].return_pct).collect();
                let positives = idx
                    .iter()
                    .filter(|i| members[**i].zone_type == ZoneType::Positive)
                    .count();
                let dominant_type = (!idx.is_empty()).then(|| {
                    if positives * 2 >= idx.len() {
                        ZoneType::Positive
                    } else {
                        ZoneType::Negative
                    }
                });
                let centroid = features
                    .iter()
                    .enumerate()
                    .filter_map(|(d, name)| {
                        let column: Vec<f64> = idx.iter().map(|i| raw[*i][d]).collect();
                        mean(&column).map(|m| (name.clone(), m))
                    })
                    .collect();
                ClusterSummary {
                    cluster: c,
                    size: idx.len(),
                    mean_duration: mean(&durations),
                    mean_return_pct: mean(&returns),
                    dominant_type,
                    centroid,
                }
            })
            .collect();

        info!(
            k,
            zones = members.len(),
            dropped,
            silhouette = silhouette.unwrap_or(f64::NAN),
            "Zone clustering complete"
        );

        Ok(ClusterAnalysis {
            k,
            features,
            assignments: members.iter().map(|z| z.id).zip(fit.labels.iter().copied()).collect(),
            clusters,
            silhouette,
            inertia: fit.inertia,
            dropped,
        })
    }
}
