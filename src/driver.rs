//! Charge controller status drivers.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DriverError, MonitorResult};
use crate::sample::Measurements;
use crate::sink::http::HttpConfig;

/// Reads the current measurements from a charge controller.
pub trait StatusDriver: Send {
    /// Returns every measurement when `all` is true, the basic set otherwise.
    ///
    /// # Errors
    ///
    /// Returns a `DriverError` if the device cannot be read.
    fn get_status(&mut self, all: bool) -> MonitorResult<Measurements>;
}

/// Where the status endpoint lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEndpoint {
    pub host: String,
    /// Path of the JSON status document, starting with `/`.
    pub path: String,
}

impl Default for StatusEndpoint {
    fn default() -> Self {
        Self {
            host: "192.168.1.20".to_string(),
            path: "/status.json".to_string(),
        }
    }
}

impl StatusEndpoint {
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}{}", self.host, self.path)
    }
}

/// Fetches `name -> {group, value, unit}` JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStatusDriver {
    client: Client,
    endpoint: StatusEndpoint,
}

impl HttpStatusDriver {
    /// # Errors
    ///
    /// Returns `DriverError::Unreachable` if the HTTP client cannot be built.
    pub fn new(endpoint: StatusEndpoint, http: &HttpConfig) -> MonitorResult<Self> {
        let client = Client::builder()
            .timeout(http.timeout)
            .user_agent(http.user_agent.clone())
            .build()
            .map_err(|e| DriverError::Unreachable {
                host: endpoint.host.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { client, endpoint })
    }

    #[must_use]
    pub const fn endpoint(&self) -> &StatusEndpoint {
        &self.endpoint
    }

    fn unreachable(&self, message: impl Into<String>) -> DriverError {
        DriverError::Unreachable {
            host: self.endpoint.host.clone(),
            message: message.into(),
        }
    }
}

impl StatusDriver for HttpStatusDriver {
    fn get_status(&mut self, all: bool) -> MonitorResult<Measurements> {
        let url = self.endpoint.url();
        debug!(url = %url, all, "reading charge controller status");

        let response = self
            .client
            .get(&url)
            .query(&[("all", all)])
            .send()
            .map_err(|e| self.unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unreachable(format!("status {status}")).into());
        }

        let body = response.text().map_err(|e| self.unreachable(e.to_string()))?;
        parse_status(&body)
    }
}

/// Parses a status document.
///
/// # Errors
///
/// Returns `DriverError::Malformed` unless `body` is a JSON object of
/// `{group, value, unit}` records.
pub fn parse_status(body: &str) -> MonitorResult<Measurements> {
    serde_json::from_str(body).map_err(|e| {
        DriverError::Malformed {
            message: e.to_string(),
        }
        .into()
    })
}
