//! Delivery targets for samples and notifications.
//!
//! Each sink family is a trait so actions can be wired to the bundled HTTP
//! clients in production and to in-memory recorders in tests. The wire
//! transforms (`TelemetryRecord`, `DataPoint`) live here because they are
//! shared by every implementation of a family.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MonitorResult;
use crate::sample::Sample;

/// Shared blocking HTTP plumbing.
pub mod http;
/// Keen IO event collection.
pub mod keenio;
/// Plain JSON webhook notifications.
pub mod webhook;
/// Xively feed updates.
pub mod xively;

pub use keenio::KeenIoSink;
pub use webhook::WebhookNotifier;
pub use xively::XivelySink;

/// One measurement flattened into an event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Measurement name.
    pub label: String,
    pub group: String,
    pub value: f64,
    pub unit: String,
    /// Source tag of the sample.
    pub source: String,
    /// When the sample was taken.
    pub event_timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    /// One record per measurement, ordered by label.
    #[must_use]
    pub fn from_sample(sample: &Sample) -> Vec<Self> {
        sample
            .sorted()
            .into_iter()
            .map(|(label, m)| Self {
                label: label.to_string(),
                group: m.group.clone(),
                value: m.value,
                unit: m.unit.clone(),
                source: sample.source().to_string(),
                event_timestamp: sample.timestamp(),
            })
            .collect()
    }
}

/// One time-series point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Stream id: the measurement name with all whitespace removed.
    pub id: String,
    pub value: f64,
    pub at: DateTime<Utc>,
}

impl DataPoint {
    /// One point per measurement, ordered by stream id.
    #[must_use]
    pub fn from_sample(sample: &Sample) -> Vec<Self> {
        let mut points: Vec<Self> = sample
            .measurements()
            .iter()
            .map(|(name, m)| Self {
                id: stream_id(name),
                value: m.value,
                at: sample.timestamp(),
            })
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        points
    }
}

/// Strips every whitespace character from a measurement name.
#[must_use]
pub fn stream_id(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Receives batches of event records.
pub trait TelemetrySink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &str;

    /// Delivers one tick's records.
    ///
    /// # Errors
    ///
    /// Returns a `DeliveryError` on transport or server failure.
    fn deliver(&self, records: &[TelemetryRecord]) -> MonitorResult<()>;
}

/// Receives time-series points.
pub trait TimeSeriesSink: Send + Sync {
    fn name(&self) -> &str;

    /// Delivers one tick's points.
    ///
    /// # Errors
    ///
    /// Returns a `DeliveryError` on transport or server failure.
    fn deliver(&self, points: &[DataPoint]) -> MonitorResult<()>;
}

/// Posts human-readable notifications.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Posts one message.
    ///
    /// # Errors
    ///
    /// Returns a `DeliveryError` on transport or server failure.
    fn post(&self, text: &str) -> MonitorResult<()>;
}
