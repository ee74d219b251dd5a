//! Contract between the validation suite and the analyses it wraps.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

/// Output of an analyze callable from which named metrics can be read.
///
/// The suite never looks inside an analysis; it only asks its output for
/// the metric being validated.
pub trait MetricSource {
    /// Finite value of `name`, or `None` when absent.
    fn metric(&self, name: &str) -> Option<f64>;

    /// Every metric the output exposes, for reporting.
    fn metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::new()
    }
}

impl MetricSource for BTreeMap<String, f64> {
    fn metric(&self, name: &str) -> Option<f64> {
        self.get(name).copied().filter(|v| v.is_finite())
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        self.iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

impl MetricSource for HashMap<String, f64> {
    fn metric(&self, name: &str) -> Option<f64> {
        self.get(name).copied().filter(|v| v.is_finite())
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        self.iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

/// Numeric top-level fields of a JSON object.
impl MetricSource for Value {
    fn metric(&self, name: &str) -> Option<f64> {
        self.get(name)?.as_f64().filter(|v| v.is_finite())
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        self.as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_f64().filter(|x| x.is_finite())?)))
                    .collect()
            })
            .unwrap_or_default()
    }
}
