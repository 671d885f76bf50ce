use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, MonitorResult};

/// HTTP client settings shared by the bundled sinks and the status driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout. A slow sink blocks only its own handler.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: format!("solar-monitor/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Builds a blocking client.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Http` if the TLS backend cannot be initialised.
    pub fn client(&self, sink: &str) -> MonitorResult<Client> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| transport(sink, &e))
    }
}

pub(crate) fn transport(sink: &str, err: &reqwest::Error) -> crate::error::MonitorError {
    DeliveryError::Http {
        sink: sink.to_string(),
        message: err.to_string(),
    }
    .into()
}

/// Maps a non-2xx response to `DeliveryError::Status`.
pub(crate) fn expect_success(sink: &str, response: &Response) -> MonitorResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status {
            sink: sink.to_string(),
            code: status.as_u16(),
        }
        .into())
    }
}

/// Joins a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("https://api.keen.io/", "/3.0/x"), "https://api.keen.io/3.0/x");
        assert_eq!(join_url("http://h", "p"), "http://h/p");
    }

    #[test]
    fn default_config_identifies_the_crate() {
        let config = HttpConfig::default();
        assert!(config.user_agent.starts_with("solar-monitor/"));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
