//! Chronologically indexed bar table.
//!
//! `BarFrame` is the tabular unit every component operates on: the external
//! zone detector hands out zone slices of it, the feature strategies read
//! named columns from it and the validation suite splits and perturbs it.
//! Indicator column names are never assumed; callers look them up by name.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Built-in column names.
pub const OPEN: &str = "open";
/// Built-in column names.
pub const HIGH: &str = "high";
/// Built-in column names.
pub const LOW: &str = "low";
/// Built-in column names.
pub const CLOSE: &str = "close";
/// Built-in column names.
pub const VOLUME: &str = "volume";

/// Ordered table of OHLC bars with optional volume and named extra columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarFrame {
    index: Vec<DateTime<Utc>>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Option<Vec<f64>>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl BarFrame {
    /// Starts building a frame.
    #[must_use]
    pub fn builder() -> BarFrameBuilder {
        BarFrameBuilder::default()
    }

    /// Number of bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the frame holds no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bar timestamps, strictly increasing.
    #[must_use]
    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    #[must_use]
    pub fn open(&self) -> &[f64] {
        &self.open
    }

    #[must_use]
    pub fn high(&self) -> &[f64] {
        &self.high
    }

    #[must_use]
    pub fn low(&self) -> &[f64] {
        &self.low
    }

    #[must_use]
    pub fn close(&self) -> &[f64] {
        &self.close
    }

    /// Volume column, if present.
    #[must_use]
    pub fn volume(&self) -> Option<&[f64]> {
        self.volume.as_deref()
    }

    /// First timestamp, if any.
    #[must_use]
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.index.first().copied()
    }

    /// Last timestamp, if any.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.index.last().copied()
    }

    /// Looks up a column by name without failing.
    #[must_use]
    pub fn try_column(&self, name: &str) -> Option<&[f64]> {
        match name {
            OPEN => Some(&self.open),
            HIGH => Some(&self.high),
            LOW => Some(&self.low),
            CLOSE => Some(&self.close),
            VOLUME => self.volume.as_deref(),
            other => self.columns.get(other).map(Vec::as_slice),
        }
    }

    /// Looks up a column by name.
    ///
    /// # Errors
    /// Returns [`AnalysisError::MissingColumn`] listing the available columns.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.try_column(name)
            .ok_or_else(|| AnalysisError::MissingColumn {
                column: name.to_string(),
                available: self.column_names().join(", "),
            })
    }

    /// Returns true if the named column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.try_column(name).is_some()
    }

    /// Names of all columns, built-ins first.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [OPEN, HIGH, LOW, CLOSE]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        if self.volume.is_some() {
            names.push(VOLUME.to_string());
        }
        names.extend(self.columns.keys().cloned());
        names
    }

    /// Copies a contiguous range of bars into a new frame.
    ///
    /// # Errors
    /// Returns a configuration error if the range is empty or out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.start >= range.end || range.end > self.len() {
            return Err(AnalysisError::configuration(
                "range",
                format!(
                    "slice {}..{} is empty or exceeds frame length {}",
                    range.start,
                    range.end,
                    self.len()
                ),
            ));
        }

        Ok(Self {
            index: self.index[range.clone()].to_vec(),
            open: self.open[range.clone()].to_vec(),
            high: self.high[range.clone()].to_vec(),
            low: self.low[range.clone()].to_vec(),
            close: self.close[range.clone()].to_vec(),
            volume: self.volume.as_ref().map(|v| v[range.clone()].to_vec()),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), v[range.clone()].to_vec()))
                .collect(),
        })
    }

    /// Returns a copy with new price columns on the same index.
    ///
    /// Volume and extra columns are carried over unchanged.
    ///
    /// # Errors
    /// Returns a configuration error if any column length differs from the index.
    pub fn with_ohlc(
        &self,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
    ) -> Result<Self> {
        for (name, values) in [(OPEN, &open), (HIGH, &high), (LOW, &low), (CLOSE, &close)] {
            check_length(name, values.len(), self.len())?;
        }

        Ok(Self {
            index: self.index.clone(),
            open,
            high,
            low,
            close,
            volume: self.volume.clone(),
            columns: self.columns.clone(),
        })
    }

    /// Reorders every per-bar value (prices, volume and extra columns) by
    /// `order` while keeping the index. Bar `i` of the result is bar
    /// `order[i]` of `self`.
    ///
    /// # Errors
    /// Returns a configuration error unless `order` is a permutation of
    /// `0..len`.
    pub fn reorder_rows(&self, order: &[usize]) -> Result<Self> {
        check_length("order", order.len(), self.len())?;
        let mut seen = vec![false; self.len()];
        for &i in order {
            if i >= self.len() || seen[i] {
                return Err(AnalysisError::configuration(
                    "order",
                    format!("position {i} is out of range or repeated"),
                ));
            }
            seen[i] = true;
        }

        let pick = |col: &[f64]| order.iter().map(|&i| col[i]).collect::<Vec<f64>>();
        Ok(Self {
            index: self.index.clone(),
            open: pick(&self.open),
            high: pick(&self.high),
            low: pick(&self.low),
            close: pick(&self.close),
            volume: self.volume.as_deref().map(pick),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), pick(v)))
                .collect(),
        })
    }

    /// Returns a copy holding only the index, prices and volume.
    #[must_use]
    pub fn without_extra_columns(&self) -> Self {
        Self {
            columns: BTreeMap::new(),
            ..self.clone()
        }
    }

    /// Returns a copy with an added or replaced extra column.
    ///
    /// # Errors
    /// Returns a configuration error on length mismatch or a built-in name.
    pub fn with_column(&self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        validate_extra_name(&name)?;
        check_length(&name, values.len(), self.len())?;
        let mut next = self.clone();
        next.columns.insert(name, values);
        Ok(next)
    }
}

fn check_length(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(AnalysisError::configuration(
            name,
            format!("column has {actual} values, index has {expected}"),
        ))
    }
}

fn validate_extra_name(name: &str) -> Result<()> {
    if name.is_empty() || [OPEN, HIGH, LOW, CLOSE, VOLUME].contains(&name) {
        return Err(AnalysisError::configuration(
            "column",
            format!("'{name}' is empty or shadows a built-in column"),
        ));
    }
    Ok(())
}

/// Builder for [`BarFrame`].
#[derive(Debug, Default)]
pub struct BarFrameBuilder {
    index: Vec<DateTime<Utc>>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Option<Vec<f64>>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl BarFrameBuilder {
    /// Sets the bar timestamps.
    #[must_use]
    pub fn index(mut self, index: Vec<DateTime<Utc>>) -> Self {
        self.index = index;
        self
    }

    /// Sets the four price columns.
    #[must_use]
    pub fn ohlc(mut self, open: Vec<f64>, high: Vec<f64>, low: Vec<f64>, close: Vec<f64>) -> Self {
        self.open = open;
        self.high = high;
        self.low = low;
        self.close = close;
        self
    }

    /// Sets the volume column.
    #[must_use]
    pub fn volume(mut self, volume: Vec<f64>) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Adds a named extra column (indicator, signal line, histogram, ...).
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.columns.insert(name.into(), values);
        self
    }

    /// Validates lengths and ordering and builds the frame.
    ///
    /// # Errors
    /// Returns a configuration error on length mismatch, reserved column
    /// names or a non-increasing index.
    pub fn build(self) -> Result<BarFrame> {
        let n = self.index.len();
        for (name, values) in [
            (OPEN, &self.open),
            (HIGH, &self.high),
            (LOW, &self.low),
            (CLOSE, &self.close),
        ] {
            check_length(name, values.len(), n)?;
        }
        if let Some(volume) = &self.volume {
            check_length(VOLUME, volume.len(), n)?;
        }
        for (name, values) in &self.columns {
            validate_extra_name(name)?;
            check_length(name, values.len(), n)?;
        }
        if let Some(pos) = self.index.windows(2).position(|w| w[1] <= w[0]) {
            return Err(AnalysisError::configuration(
                "index",
                format!("timestamps must be strictly increasing (violation at bar {})", pos + 1),
            ));
        }

        Ok(BarFrame {
            index: self.index,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            columns: self.columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn timestamps(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    fn sample_frame(n: usize) -> BarFrame {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        BarFrame::builder()
            .index(timestamps(n))
            .ohlc(
                close.clone(),
                close.iter().map(|c| c + 1.0).collect(),
                close.iter().map(|c| c - 1.0).collect(),
                close.clone(),
            )
            .volume(vec![1_000.0; n])
            .column("macd", (0..n).map(|i| i as f64 * 0.1).collect())
            .build()
            .unwrap()
    }

    // ============================================
    // Construction Tests
    // ============================================

    #[test]
    fn builder_rejects_length_mismatch() {
        let result = BarFrame::builder()
            .index(timestamps(3))
            .ohlc(vec![1.0; 3], vec![1.0; 3], vec![1.0; 2], vec![1.0; 3])
            .build();
        assert!(matches!(result, Err(AnalysisError::Configuration { .. })));
    }

    #[test]
    fn builder_rejects_unordered_index() {
        let mut index = timestamps(3);
        index.swap(1, 2);
        let result = BarFrame::builder()
            .index(index)
            .ohlc(vec![1.0; 3], vec![1.0; 3], vec![1.0; 3], vec![1.0; 3])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_reserved_extra_column() {
        let result = BarFrame::builder()
            .index(timestamps(2))
            .ohlc(vec![1.0; 2], vec![1.0; 2], vec![1.0; 2], vec![1.0; 2])
            .column("close", vec![1.0; 2])
            .build();
        assert!(result.is_err());
    }

    // ============================================
    // Column Access Tests
    // ============================================

    #[test]
    fn column_lookup_covers_builtins_and_extras() {
        let frame = sample_frame(5);
        assert_eq!(frame.column("close").unwrap().len(), 5);
        assert_eq!(frame.column("volume").unwrap()[0], 1_000.0);
        assert!((frame.column("macd").unwrap()[4] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn missing_column_error_lists_available() {
        let frame = sample_frame(5);
        let err = frame.column("rsi").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("rsi"));
        assert!(msg.contains("macd"));
    }

    // ============================================
    // Slicing Tests
    // ============================================

    #[test]
    fn slice_keeps_all_columns_aligned() {
        let frame = sample_frame(10);
        let part = frame.slice(2..5).unwrap();
        assert_eq!(part.len(), 3);
        assert_eq!(part.close()[0], 102.0);
        assert_eq!(part.index()[0], frame.index()[2]);
        assert_eq!(part.volume().unwrap().len(), 3);
        assert!((part.column("macd").unwrap()[0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn slice_out_of_bounds_fails() {
        let frame = sample_frame(4);
        assert!(frame.slice(2..9).is_err());
        assert!(frame.slice(3..3).is_err());
    }

    #[test]
    fn with_ohlc_preserves_index() {
        let frame = sample_frame(4);
        let replaced = frame
            .with_ohlc(vec![1.0; 4], vec![2.0; 4], vec![0.5; 4], vec![1.5; 4])
            .unwrap();
        assert_eq!(replaced.index(), frame.index());
        assert_eq!(replaced.close(), &[1.5; 4]);
        assert!(replaced.has_column("macd"));
    }

    // ============================================
    // Row Reordering Tests
    // ============================================

    #[test]
    fn reorder_rows_moves_every_value_column_together() {
        let frame = sample_frame(5);
        let moved = frame.reorder_rows(&[3, 0, 4, 1, 2]).unwrap();
        assert_eq!(moved.index(), frame.index());
        assert_eq!(moved.close(), &[103.0, 100.0, 104.0, 101.0, 102.0]);
        assert_eq!(moved.high()[0], 104.0);
        for (i, &src) in [3, 0, 4, 1, 2].iter().enumerate() {
            assert_eq!(moved.column("macd").unwrap()[i], frame.column("macd").unwrap()[src]);
            assert_eq!(moved.volume().unwrap()[i], frame.volume().unwrap()[src]);
        }
    }

    #[test]
    fn reorder_rows_rejects_non_permutations() {
        let frame = sample_frame(4);
        assert!(frame.reorder_rows(&[0, 1, 2]).is_err());
        assert!(frame.reorder_rows(&[0, 1, 1, 3]).is_err());
        assert!(frame.reorder_rows(&[0, 1, 2, 4]).is_err());
    }

    #[test]
    fn without_extra_columns_keeps_prices_and_volume() {
        let frame = sample_frame(4);
        let bare = frame.without_extra_columns();
        assert!(!bare.has_column("macd"));
        assert_eq!(bare.close(), frame.close());
        assert_eq!(bare.volume(), frame.volume());
        assert_eq!(bare.column_names().len(), 5);
    }
}
