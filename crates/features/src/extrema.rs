//! Local extrema detection shared by the extractor and several strategies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PivotKind {
    High,
    Low,
}

/// A confirmed turning point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

impl Pivot {
    #[must_use]
    pub fn high(index: usize, price: f64) -> Self {
        Self {
            index,
            price,
            kind: PivotKind::High,
        }
    }

    #[must_use]
    pub fn low(index: usize, price: f64) -> Self {
        Self {
            index,
            price,
            kind: PivotKind::Low,
        }
    }
}

/// Finds local maxima.
///
/// A peak is a sample (or the middle of a flat plateau) strictly higher than
/// its neighbours. Peaks closer than `distance` samples to a higher peak are
/// dropped, then peaks whose prominence is below `min_prominence` are dropped.
/// Endpoints are never peaks.
#[must_use]
pub fn find_peaks(values: &[f64], distance: usize, min_prominence: f64) -> Vec<usize> {
    let n = values.len();
    if n < 3 {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    let mut i = 1;
    while i < n - 1 {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                candidates.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    let candidates = enforce_distance(values, candidates, distance.max(1));

    candidates
        .into_iter()
        .filter(|&p| prominence(values, p) >= min_prominence)
        .collect()
}

/// Finds local minima (peaks of the negated series).
#[must_use]
pub fn find_troughs(values: &[f64], distance: usize, min_prominence: f64) -> Vec<usize> {
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    find_peaks(&negated, distance, min_prominence)
}

fn enforce_distance(values: &[f64], peaks: Vec<usize>, distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks;
    }

    let mut by_height: Vec<usize> = (0..peaks.len()).collect();
    by_height.sort_by(|a, b| values[peaks[*b]].total_cmp(&values[peaks[*a]]));

    let mut keep = vec![true; peaks.len()];
    for &idx in &by_height {
        if !keep[idx] {
            continue;
        }
        for (other, flag) in keep.iter_mut().enumerate() {
            if other != idx && peaks[other].abs_diff(peaks[idx]) < distance {
                *flag = false;
            }
        }
        keep[idx] = true;
    }

    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}

/// Height of a peak above the higher of its two surrounding bases.
#[must_use]
pub fn prominence(values: &[f64], peak: usize) -> f64 {
    let height = values[peak];

    let mut left_min = height;
    for v in values[..peak].iter().rev() {
        if *v > height {
            break;
        }
        left_min = left_min.min(*v);
    }

    let mut right_min = height;
    for v in &values[peak + 1..] {
        if *v > height {
            break;
        }
        right_min = right_min.min(*v);
    }

    height - left_min.max(right_min)
}

/// Orders pivots by index and collapses consecutive same-kind pivots,
/// keeping the more extreme one, so highs and lows alternate.
#[must_use]
pub fn alternate(mut pivots: Vec<Pivot>) -> Vec<Pivot> {
    pivots.sort_by_key(|p| p.index);
    let mut out: Vec<Pivot> = Vec::with_capacity(pivots.len());
    for pivot in pivots {
        match out.last_mut() {
            Some(last) if last.kind == pivot.kind => {
                let more_extreme = match pivot.kind {
                    PivotKind::High => pivot.price > last.price,
                    PivotKind::Low => pivot.price < last.price,
                };
                if more_extreme {
                    *last = pivot;
                }
            }
            Some(last) if last.index == pivot.index => {}
            _ => out.push(pivot),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_simple_peaks_and_troughs() {
        let v = [1.0, 3.0, 1.0, 4.0, 1.0, 2.0, 1.0];
        assert_eq!(find_peaks(&v, 1, 0.0), vec![1, 3, 5]);
        assert_eq!(find_troughs(&v, 1, 0.0), vec![2, 4]);
    }

    #[test]
    fn plateau_peak_uses_midpoint() {
        let v = [0.0, 2.0, 2.0, 2.0, 0.0];
        assert_eq!(find_peaks(&v, 1, 0.0), vec![2]);
    }

    #[test]
    fn monotonic_series_has_no_peaks() {
        let v: Vec<f64> = (0..10).map(f64::from).collect();
        assert!(find_peaks(&v, 1, 0.0).is_empty());
        assert!(find_troughs(&v, 1, 0.0).is_empty());
    }

    #[test]
    fn distance_keeps_the_higher_peak() {
        let v = [0.0, 3.0, 0.0, 5.0, 0.0, 0.0, 0.0, 2.0, 0.0];
        assert_eq!(find_peaks(&v, 3, 0.0), vec![3, 7]);
    }

    #[test]
    fn prominence_filters_small_bumps() {
        let v = [0.0, 5.0, 4.8, 4.9, 0.0];
        assert_eq!(find_peaks(&v, 1, 0.0), vec![1, 3]);
        assert_eq!(find_peaks(&v, 1, 1.0), vec![1]);
        assert!((prominence(&v, 3) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn alternate_merges_same_kind() {
        let pivots = vec![
            Pivot::low(0, 10.0),
            Pivot::high(2, 12.0),
            Pivot::high(4, 13.0),
            Pivot::low(6, 11.0),
            Pivot::low(7, 10.5),
        ];
        let out = alternate(pivots);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], Pivot::high(4, 13.0));
        assert_eq!(out[2], Pivot::low(7, 10.5));
    }
}
