//! K-Means with k-means++ seeding, z-score standardisation and silhouette scoring.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zone_analysis_core::stats::negligible_spread;
use zone_analysis_core::{AnalysisError, Result};

/// Lloyd's algorithm with a seeded k-means++ initialisation.
#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    k: usize,
    max_iterations: usize,
    seed: u64,
    tolerance: f64,
}

/// Converged clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansFit {
    /// Cluster index of each point.
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeans {
    #[must_use]
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k,
            max_iterations: 300,
            seed,
            tolerance: 1e-8,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Clusters `points` (rows of equal length).
    ///
    /// # Errors
    /// Returns [`AnalysisError::Configuration`] for `k == 0` or ragged rows and
    /// [`AnalysisError::InsufficientData`] when there are fewer points than clusters.
    pub fn fit(&self, points: &[Vec<f64>]) -> Result<KMeansFit> {
        if self.k == 0 {
            return Err(AnalysisError::configuration("k", "must be >= 1"));
        }
        if points.len() < self.k {
            return Err(AnalysisError::insufficient("k-means", self.k, points.len()));
        }
        let dim = points[0].len();
        if points.iter().any(|p| p.len() != dim) {
            return Err(AnalysisError::configuration("points", "rows must have equal length"));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut centroids = self.seed_centroids(points, &mut rng);
        let mut labels = vec![usize::MAX; points.len()];
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let mut changed = false;
            for (i, point) in points.iter().enumerate() {
                let nearest = nearest(point, &centroids).0;
                if labels[i] != nearest {
                    labels[i] = nearest;
                    changed = true;
                }
            }

            let mut shift: f64 = 0.0;
            for (c, centroid) in centroids.iter_mut().enumerate() {
                let members: Vec<&Vec<f64>> = points
                    .iter()
                    .zip(&labels)
                    .filter(|(_, l)| **l == c)
                    .map(|(p, _)| p)
                    .collect();
                // empty clusters keep their previous centroid
                if members.is_empty() {
                    continue;
                }
                let updated: Vec<f64> = (0..dim)
                    .map(|d| members.iter().map(|m| m[d]).sum::<f64>() / members.len() as f64)
                    .collect();
                shift = shift.max(squared_distance(centroid, &updated));
                *centroid = updated;
            }

            if !changed || shift <= self.tolerance {
                break;
            }
        }

        let inertia = points
            .iter()
            .zip(&labels)
            .map(|(p, l)| squared_distance(p, &centroids[*l]))
            .sum();
        debug!(k = self.k, iterations, inertia, "k-means converged");

        Ok(KMeansFit {
            labels,
            centroids,
            inertia,
            iterations,
        })
    }

    fn seed_centroids(&self, points: &[Vec<f64>], rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(points[rng.gen_range(0..points.len())].clone());

        while centroids.len() < self.k {
            let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
            let total: f64 = weights.iter().sum();
            let pick = if total <= 0.0 {
                rng.gen_range(0..points.len())
            } else {
                let target = rng.gen::<f64>() * total;
                let mut acc = 0.0;
                weights
                    .iter()
                    .position(|w| {
                        acc += w;
                        acc >= target
                    })
                    .unwrap_or(points.len() - 1)
            };
            centroids.push(points[pick].clone());
        }
        centroids
    }
}

/// Index of and squared distance to the closest centroid (lowest index on ties).
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Z-scores every column with the population standard deviation.
///
/// Constant columns, judged relative to their own magnitude, become zero.
#[must_use]
pub fn standardize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let n = rows.len() as f64;
    let stats: Vec<Option<(f64, f64)>> = (0..first.len())
        .map(|d| {
            let column: Vec<f64> = rows.iter().map(|r| r[d]).collect();
            let mean = column.iter().sum::<f64>() / n;
            let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            (!negligible_spread(var, &column)).then(|| (mean, var.sqrt()))
        })
        .collect();

    rows.iter()
        .map(|r| {
            r.iter()
                .zip(&stats)
                .map(|(v, col)| col.map_or(0.0, |(mean, std)| (v - mean) / std))
                .collect()
        })
        .collect()
}

/// Mean silhouette coefficient over all points.
///
/// Returns `None` unless the labels use between 2 and `n - 1` distinct clusters.
/// Points alone in their cluster score 0.
#[must_use]
pub fn silhouette_score(points: &[Vec<f64>], labels: &[usize]) -> Option<f64> {
    let n = points.len();
    let mut distinct: Vec<usize> = labels.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    if n != labels.len() || distinct.len() < 2 || distinct.len() >= n {
        return None;
    }

    let total: f64 = (0..n)
        .map(|i| {
            let own = labels[i];
            let own_size = labels.iter().filter(|l| **l == own).count();
            if own_size <= 1 {
                return 0.0;
            }
            let mean_distance = |cluster: usize| {
                let (sum, count) = (0..n)
                    .filter(|j| *j != i && labels[*j] == cluster)
                    .fold((0.0, 0usize), |(s, c), j| {
                        (s + squared_distance(&points[i], &points[j]).sqrt(), c + 1)
                    });
                sum / count as f64
            };
            let a = mean_distance(own);
            let b = distinct
                .iter()
                .filter(|c| **c != own)
                .map(|c| mean_distance(*c))
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .sum();
    Some(total / n as f64)
}
