//! Status samples produced once per polling tick.
//!
//! A `Sample` is immutable once built. It is shared by reference (`Arc`) with
//! every trigger and handler of a tick, so nothing downstream may mutate it;
//! sinks that need a different shape build their own copies.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SampleError;

/// Name of the battery voltage measurement reported by the charge controller.
pub const BATTERY_VOLTAGE: &str = "Battery Voltage";

/// Name of the charge current measurement reported by the charge controller.
pub const CHARGE_CURRENT: &str = "Charge Current";

/// Source tag used for samples taken from the charge controller.
pub const DEFAULT_SOURCE: &str = "solar";

/// A single named measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Group the measurement belongs to (e.g. "Battery", "Array").
    pub group: String,
    /// Measured value.
    pub value: f64,
    /// Unit of `value` (e.g. "V", "A").
    pub unit: String,
}

impl Measurement {
    /// Creates a measurement.
    #[must_use]
    pub fn new(group: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            value,
            unit: unit.into(),
        }
    }
}

/// Measurements keyed by name.
pub type Measurements = HashMap<String, Measurement>;

/// Unique identifier of a sample, used to correlate log lines of one tick.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(Uuid);

impl SampleId {
    /// Create a new random sample id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SampleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One immutable snapshot of device measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    id: SampleId,
    source: String,
    timestamp: DateTime<Utc>,
    measurements: Measurements,
}

impl Sample {
    /// Creates a sample taken at `timestamp`.
    #[must_use]
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>, measurements: Measurements) -> Self {
        Self {
            id: SampleId::new(),
            source: source.into(),
            timestamp,
            measurements,
        }
    }

    /// Starts a builder, convenient for tests and drivers that add
    /// measurements one at a time.
    #[must_use]
    pub fn builder(source: impl Into<String>) -> SampleBuilder {
        SampleBuilder {
            source: source.into(),
            timestamp: None,
            measurements: Measurements::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SampleId {
        self.id
    }

    /// Origin subsystem tag.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Point in time the measurements were taken (UTC).
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub const fn measurements(&self) -> &Measurements {
        &self.measurements
    }

    /// Looks up a measurement by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Measurement> {
        self.measurements.get(name)
    }

    /// Looks up a measurement that must be present.
    ///
    /// # Errors
    ///
    /// Returns `SampleError::MissingMeasurement` if `name` is absent.
    pub fn require(&self, name: &str) -> Result<&Measurement, SampleError> {
        self.measurements
            .get(name)
            .ok_or_else(|| SampleError::MissingMeasurement { name: name.to_string() })
    }

    /// Measurements sorted by name, for deterministic output.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&str, &Measurement)> {
        let mut out: Vec<(&str, &Measurement)> =
            self.measurements.iter().map(|(k, v)| (k.as_str(), v)).collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }
}

/// Builder for [`Sample`].
#[derive(Debug)]
pub struct SampleBuilder {
    source: String,
    timestamp: Option<DateTime<Utc>>,
    measurements: Measurements,
}

impl SampleBuilder {
    /// Sets the sample timestamp (defaults to now).
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Adds (or replaces) a measurement.
    #[must_use]
    pub fn measurement(
        mut self,
        name: impl Into<String>,
        group: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        self.measurements.insert(name.into(), Measurement::new(group, value, unit));
        self
    }

    #[must_use]
    pub fn build(self) -> Sample {
        Sample::new(self.source, self.timestamp.unwrap_or_else(Utc::now), self.measurements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builder_collects_measurements() {
        let at = Utc.with_ymd_and_hms(2016, 1, 3, 4, 55, 59).unwrap();
        let sample = Sample::builder("solar")
            .at(at)
            .measurement(BATTERY_VOLTAGE, "Battery", 12.1, "V")
            .measurement("Array Current", "Array", 1.0, "A")
            .build();

        assert_eq!(sample.source(), "solar");
        assert_eq!(sample.timestamp(), at);
        assert_eq!(sample.measurements().len(), 2);
        assert_eq!(sample.get(BATTERY_VOLTAGE).unwrap().value, 12.1);
    }

    #[test]
    fn require_reports_missing_measurement() {
        let sample = Sample::builder("solar").build();
        let err = sample.require(CHARGE_CURRENT).unwrap_err();
        assert_eq!(
            err,
            SampleError::MissingMeasurement {
                name: CHARGE_CURRENT.to_string()
            }
        );
    }

    #[test]
    fn sorted_orders_by_name() {
        let sample = Sample::builder("solar")
            .measurement("b", "g", 2.0, "V")
            .measurement("a", "g", 1.0, "V")
            .build();
        let names: Vec<&str> = sample.sorted().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn every_sample_gets_its_own_id() {
        let a = Sample::builder("solar").build();
        let b = Sample::builder("solar").build();
        assert_ne!(a.id(), b.id());
    }
}
