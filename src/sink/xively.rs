//! Xively feed sink: every measurement is a datastream of one feed.

use chrono::SecondsFormat;
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::MonitorResult;

use super::http::{expect_success, join_url, transport, HttpConfig};
use super::{DataPoint, TimeSeriesSink};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.xively.com";

const NAME: &str = "xively";
const FEED_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, PartialEq)]
struct Datastream {
    id: String,
    current_value: String,
    at: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct FeedUpdate {
    version: &'static str,
    datastreams: Vec<Datastream>,
}

impl FeedUpdate {
    fn new(points: &[DataPoint]) -> Self {
        Self {
            version: FEED_VERSION,
            datastreams: points
                .iter()
                .map(|p| Datastream {
                    id: p.id.clone(),
                    current_value: p.value.to_string(),
                    at: p.at.to_rfc3339_opts(SecondsFormat::Micros, true),
                })
                .collect(),
        }
    }
}

/// Sink updating the datastreams of a Xively feed.
#[derive(Debug, Clone)]
pub struct XivelySink {
    client: Client,
    base_url: String,
    api_key: String,
    feed_id: String,
}

impl XivelySink {
    /// # Errors
    ///
    /// Returns `DeliveryError::Http` if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, feed_id: impl Into<String>, http: &HttpConfig) -> MonitorResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, feed_id, http)
    }

    /// # Errors
    ///
    /// Returns `DeliveryError::Http` if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        feed_id: impl Into<String>,
        http: &HttpConfig,
    ) -> MonitorResult<Self> {
        Ok(Self {
            client: http.client(NAME)?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            feed_id: feed_id.into(),
        })
    }

    #[must_use]
    pub fn url(&self) -> String {
        join_url(&self.base_url, &format!("v2/feeds/{}.json", self.feed_id))
    }
}

impl TimeSeriesSink for XivelySink {
    fn name(&self) -> &str {
        NAME
    }

    fn deliver(&self, points: &[DataPoint]) -> MonitorResult<()> {
        debug!(sink = NAME, datastreams = points.len(), "updating feed");
        let response = self
            .client
            .put(self.url())
            .header("X-ApiKey", &self.api_key)
            .json(&FeedUpdate::new(points))
            .send()
            .map_err(|e| transport(NAME, &e))?;
        expect_success(NAME, &response)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::sample::{Sample, BATTERY_VOLTAGE};

    #[test]
    fn feed_update_lists_one_datastream_per_point() {
        let sample = Sample::builder("solar")
            .at(Utc.with_ymd_and_hms(2016, 1, 3, 4, 55, 59).unwrap())
            .measurement(BATTERY_VOLTAGE, "Battery", 12.5, "V")
            .build();
        let update = FeedUpdate::new(&DataPoint::from_sample(&sample));

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["datastreams"][0]["id"], "BatteryVoltage");
        assert_eq!(json["datastreams"][0]["current_value"], "12.5");
        assert_eq!(json["datastreams"][0]["at"], "2016-01-03T04:55:59.000000Z");
    }

    #[test]
    fn url_targets_feed() {
        let sink = XivelySink::with_base_url("https://api.xively.com", "key", "1234", &HttpConfig::default()).unwrap();
        assert_eq!(sink.url(), "https://api.xively.com/v2/feeds/1234.json");
    }
}
