//! Zone records handed over by the external zone detector.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::frame::BarFrame;

/// Sign of the driving oscillator within a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    /// Oscillator above zero.
    Positive,
    /// Oscillator below zero.
    Negative,
}

impl ZoneType {
    /// Classifies an oscillator value; zero counts as positive.
    #[must_use]
    pub fn from_value(value: f64) -> Self {
        if value >= 0.0 {
            Self::Positive
        } else {
            Self::Negative
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous same-sign run of bars.
///
/// Immutable once built; the feature extractor only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    id: usize,
    zone_type: ZoneType,
    data: BarFrame,
    baseline_volume: Option<f64>,
}

impl ZoneRecord {
    /// Creates a zone from its bar slice.
    ///
    /// # Errors
    /// Returns a configuration error if `data` is empty.
    pub fn new(id: usize, zone_type: ZoneType, data: BarFrame) -> Result<Self> {
        if data.is_empty() {
            return Err(AnalysisError::configuration(
                "data",
                format!("zone {id} has no bars; duration must be >= 1"),
            ));
        }
        Ok(Self {
            id,
            zone_type,
            data,
            baseline_volume: None,
        })
    }

    /// Attaches the average volume of the bars preceding the zone.
    #[must_use]
    pub fn with_baseline_volume(mut self, baseline: Option<f64>) -> Self {
        self.baseline_volume = baseline.filter(|v| v.is_finite() && *v > 0.0);
        self
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn zone_type(&self) -> ZoneType {
        self.zone_type
    }

    /// Number of bars in the zone (always >= 1).
    #[must_use]
    pub fn duration(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn data(&self) -> &BarFrame {
        &self.data
    }

    /// Baseline volume supplied by the detector, if any.
    #[must_use]
    pub fn baseline_volume(&self) -> Option<f64> {
        self.baseline_volume
    }

    /// Timestamp of the first bar.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.data.first_timestamp()
    }

    /// Timestamp of the last bar.
    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.data.last_timestamp()
    }
}

/// Interface of the external component that cuts a series into zones.
///
/// No implementation ships with the library; the boundary logic is owned by
/// the caller.
pub trait ZoneDetector: Send + Sync {
    /// Splits `data` into chronologically ordered zones.
    ///
    /// # Errors
    /// Implementations return an error when required columns are missing.
    fn detect(&self, data: &BarFrame) -> Result<Vec<ZoneRecord>>;
}
