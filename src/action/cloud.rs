//! Cloud delivery actions: reshape the sample and hand it to a sink.

use std::sync::Arc;

use tracing::info;

use crate::error::MonitorResult;
use crate::event::Action;
use crate::sample::Sample;
use crate::sink::{DataPoint, TelemetryRecord, TelemetrySink, TimeSeriesSink};

/// Delivers every measurement as an event record.
pub struct TelemetryAction {
    name: String,
    sink: Arc<dyn TelemetrySink>,
}

impl TelemetryAction {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            name: format!("{}-telemetry", sink.name()),
            sink,
        }
    }
}

impl std::fmt::Debug for TelemetryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryAction").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Action for TelemetryAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, sample: &Sample) -> MonitorResult<()> {
        let records = TelemetryRecord::from_sample(sample);
        self.sink.deliver(&records)?;
        info!(handler = %self.name, sample = %sample.id(), records = records.len(), at = %sample.timestamp(), "telemetry delivered");
        Ok(())
    }
}

/// Delivers every measurement as a time-series point.
pub struct TimeSeriesAction {
    name: String,
    sink: Arc<dyn TimeSeriesSink>,
}

impl TimeSeriesAction {
    pub fn new(sink: Arc<dyn TimeSeriesSink>) -> Self {
        Self {
            name: format!("{}-timeseries", sink.name()),
            sink,
        }
    }
}

impl std::fmt::Debug for TimeSeriesAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSeriesAction").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Action for TimeSeriesAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, sample: &Sample) -> MonitorResult<()> {
        let points = DataPoint::from_sample(sample);
        self.sink.deliver(&points)?;
        info!(handler = %self.name, sample = %sample.id(), points = points.len(), at = %sample.timestamp(), "time series updated");
        Ok(())
    }
}
