//! Keen IO event collection sink.
//!
//! One tick becomes one batch request adding every record to the `offgrid`
//! collection of the project.

use chrono::SecondsFormat;
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::{DeliveryError, MonitorResult};

use super::http::{expect_success, join_url, transport, HttpConfig};
use super::{TelemetryRecord, TelemetrySink};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.keen.io";

/// Event collection every record is added to.
pub const COLLECTION: &str = "offgrid";

const NAME: &str = "keenio";

#[derive(Debug, Serialize)]
struct KeenMeta {
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct KeenEvent<'a> {
    #[serde(flatten)]
    record: &'a TelemetryRecord,
    keen: KeenMeta,
}

/// Sink adding records to a Keen IO project.
#[derive(Debug, Clone)]
pub struct KeenIoSink {
    client: Client,
    base_url: String,
    project_id: String,
    write_key: String,
}

impl KeenIoSink {
    /// Creates a sink against the public API.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Http` if the HTTP client cannot be built.
    pub fn new(project_id: impl Into<String>, write_key: impl Into<String>, http: &HttpConfig) -> MonitorResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, project_id, write_key, http)
    }

    /// Creates a sink against another endpoint.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Http` if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        write_key: impl Into<String>,
        http: &HttpConfig,
    ) -> MonitorResult<Self> {
        Ok(Self {
            client: http.client(NAME)?,
            base_url: base_url.into(),
            project_id: project_id.into(),
            write_key: write_key.into(),
        })
    }

    #[must_use]
    pub fn url(&self) -> String {
        join_url(&self.base_url, &format!("3.0/projects/{}/events", self.project_id))
    }

    /// Request body for a batch of records.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Serialization` if a record cannot be encoded.
    pub fn body(records: &[TelemetryRecord]) -> MonitorResult<serde_json::Value> {
        let events: Vec<KeenEvent<'_>> = records
            .iter()
            .map(|record| KeenEvent {
                record,
                keen: KeenMeta {
                    timestamp: record.event_timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                },
            })
            .collect();

        let mut body = serde_json::Map::new();
        let events = serde_json::to_value(events).map_err(|e| DeliveryError::Serialization {
            message: e.to_string(),
        })?;
        body.insert(COLLECTION.to_string(), events);
        Ok(serde_json::Value::Object(body))
    }
}

impl TelemetrySink for KeenIoSink {
    fn name(&self) -> &str {
        NAME
    }

    fn deliver(&self, records: &[TelemetryRecord]) -> MonitorResult<()> {
        let body = Self::body(records)?;
        debug!(sink = NAME, records = records.len(), "sending events");

        let response = self
            .client
            .post(self.url())
            .header("Authorization", &self.write_key)
            .json(&body)
            .send()
            .map_err(|e| transport(NAME, &e))?;
        expect_success(NAME, &response)
    }
}
