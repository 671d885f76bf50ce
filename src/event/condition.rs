//! Condition evaluators gating trigger fan-out.
//!
//! A condition is owned by exactly one trigger and only ever evaluated on that
//! trigger's consumer thread, so stateful evaluators (edge detection) keep
//! their previous observation in a plain field with no locking.

use serde::{Deserialize, Serialize};

use crate::error::MonitorResult;
use crate::sample::{Sample, BATTERY_VOLTAGE, CHARGE_CURRENT};

/// Predicate over a sample, possibly stateful.
pub trait Condition: Send + 'static {
    /// Returns true if the sample should be fanned out to the handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample lacks what the condition needs. The
    /// trigger then treats the sample as not matching.
    fn evaluate(&mut self, sample: &Sample) -> MonitorResult<bool>;
}

impl<F> Condition for F
where
    F: FnMut(&Sample) -> MonitorResult<bool> + Send + 'static,
{
    fn evaluate(&mut self, sample: &Sample) -> MonitorResult<bool> {
        self(sample)
    }
}

/// Matches every sample ("data updated").
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Condition for Always {
    fn evaluate(&mut self, _sample: &Sample) -> MonitorResult<bool> {
        Ok(true)
    }
}

/// Direction of a threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// Fires when the value drops below the threshold (`value < threshold`).
    Falling,
    /// Fires when the value reaches the threshold (`value >= threshold`).
    Rising,
}

/// Fires once per crossing of `threshold` by a named measurement.
///
/// The first observation fires if the value is already past the threshold.
/// After that only a genuine crossing fires: the previous value must have
/// been on the other side. The previous value is updated on every
/// evaluation, matched or not.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCrossing {
    measurement: String,
    threshold: f64,
    edge: Edge,
    previous: Option<f64>,
}

impl EdgeCrossing {
    #[must_use]
    pub fn new(measurement: impl Into<String>, threshold: f64, edge: Edge) -> Self {
        Self {
            measurement: measurement.into(),
            threshold,
            edge,
            previous: None,
        }
    }

    /// Battery voltage falling below `threshold`.
    #[must_use]
    pub fn battery_low(threshold: f64) -> Self {
        Self::new(BATTERY_VOLTAGE, threshold, Edge::Falling)
    }

    /// Battery voltage reaching `threshold` (charged).
    #[must_use]
    pub fn battery_full(threshold: f64) -> Self {
        Self::new(BATTERY_VOLTAGE, threshold, Edge::Rising)
    }

    /// Charge current reaching `threshold`.
    #[must_use]
    pub fn charge_current_high(threshold: f64) -> Self {
        Self::new(CHARGE_CURRENT, threshold, Edge::Rising)
    }

    #[must_use]
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    #[must_use]
    pub const fn edge(&self) -> Edge {
        self.edge
    }

    /// Last observed value, `None` before the first sample.
    #[must_use]
    pub const fn previous(&self) -> Option<f64> {
        self.previous
    }

    fn is_past(&self, value: f64) -> bool {
        match self.edge {
            Edge::Falling => value < self.threshold,
            Edge::Rising => value >= self.threshold,
        }
    }

    /// Feeds one observation and reports whether it is a crossing.
    pub fn observe(&mut self, current: f64) -> bool {
        let fired = match self.previous {
            None => self.is_past(current),
            Some(previous) => match self.edge {
                Edge::Falling => previous >= self.threshold && current < self.threshold,
                Edge::Rising => previous < self.threshold && current >= self.threshold,
            },
        };
        self.previous = Some(current);
        fired
    }
}

impl Condition for EdgeCrossing {
    fn evaluate(&mut self, sample: &Sample) -> MonitorResult<bool> {
        // A missing measurement leaves `previous` untouched.
        let current = sample.require(&self.measurement)?.value;
        Ok(self.observe(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::{MonitorError, SampleError};

    fn battery(value: f64) -> Sample {
        Sample::builder("solar")
            .measurement(BATTERY_VOLTAGE, "Battery", value, "V")
            .build()
    }

    fn feed(cond: &mut EdgeCrossing, values: &[f64]) -> Vec<bool> {
        values.iter().map(|v| cond.evaluate(&battery(*v)).unwrap()).collect()
    }

    #[test]
    fn always_matches() {
        let mut cond = Always;
        assert!(cond.evaluate(&battery(0.0)).unwrap());
    }

    #[test]
    fn falling_edge_fires_once_per_descent() {
        let mut cond = EdgeCrossing::battery_low(12.0);
        assert_eq!(feed(&mut cond, &[12.0, 11.9, 11.8]), vec![false, true, false]);
        assert_eq!(cond.previous(), Some(11.8));
    }

    #[test]
    fn falling_edge_rearms_after_recovery() {
        let mut cond = EdgeCrossing::battery_low(12.0);
        assert_eq!(
            feed(&mut cond, &[13.0, 11.0, 11.5, 12.0, 11.9]),
            vec![false, true, false, false, true]
        );
    }

    #[test]
    fn falling_edge_fires_on_low_first_sample() {
        let mut cond = EdgeCrossing::battery_low(12.0);
        assert_eq!(feed(&mut cond, &[11.0, 10.0]), vec![true, false]);
    }

    #[test]
    fn falling_edge_threshold_itself_is_not_low() {
        let mut cond = EdgeCrossing::battery_low(12.0);
        assert_eq!(feed(&mut cond, &[12.0]), vec![false]);
    }

    #[test]
    fn rising_edge_crossing_and_bootstrap() {
        let mut cond = EdgeCrossing::battery_full(25.0);
        assert_eq!(feed(&mut cond, &[24.0, 25.1, 25.2]), vec![false, true, false]);

        let mut fresh = EdgeCrossing::battery_full(25.0);
        assert_eq!(feed(&mut fresh, &[25.0]), vec![true]);
    }

    #[test]
    fn rising_edge_rearms_after_dropping_below() {
        let mut cond = EdgeCrossing::battery_full(25.0);
        assert_eq!(
            feed(&mut cond, &[26.0, 25.5, 24.9, 25.0]),
            vec![true, false, false, true]
        );
    }

    #[test]
    fn nan_previous_value_is_not_a_crossing() {
        let mut low = EdgeCrossing::battery_low(12.0);
        assert_eq!(feed(&mut low, &[f64::NAN, 11.0]), vec![false, false]);
        assert_eq!(feed(&mut low, &[12.5, 11.0]), vec![false, true]);

        let mut full = EdgeCrossing::battery_full(25.0);
        assert_eq!(feed(&mut full, &[f64::NAN, 26.0]), vec![false, false]);
        assert_eq!(feed(&mut full, &[24.0, 26.0]), vec![false, true]);
    }

    #[test]
    fn missing_measurement_is_an_error_and_keeps_state() {
        let mut cond = EdgeCrossing::charge_current_high(10.0);
        let err = cond.evaluate(&battery(12.0)).unwrap_err();
        assert_eq!(
            err,
            MonitorError::Sample(SampleError::MissingMeasurement {
                name: CHARGE_CURRENT.to_string()
            })
        );
        assert_eq!(cond.previous(), None);
    }

    #[test]
    fn closures_are_conditions() {
        let mut seen = 0;
        let mut cond = move |_: &Sample| -> MonitorResult<bool> {
            seen += 1;
            Ok(seen % 2 == 0)
        };
        assert!(!cond.evaluate(&battery(1.0)).unwrap());
        assert!(cond.evaluate(&battery(1.0)).unwrap());
    }
}
