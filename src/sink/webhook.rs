//! Webhook notifier: posts `{"text": ...}` to a chat or status webhook.

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::MonitorResult;

use super::http::{expect_success, transport, HttpConfig};
use super::NotificationSink;

const NAME: &str = "webhook";

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

/// Posts notifications to a single webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns `DeliveryError::Http` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, http: &HttpConfig) -> MonitorResult<Self> {
        Ok(Self {
            client: http.client(NAME)?,
            url: url.into(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NotificationSink for WebhookNotifier {
    fn name(&self) -> &str {
        NAME
    }

    fn post(&self, text: &str) -> MonitorResult<()> {
        debug!(sink = NAME, chars = text.chars().count(), "posting notification");
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { text })
            .send()
            .map_err(|e| transport(NAME, &e))?;
        expect_success(NAME, &response)
    }
}
