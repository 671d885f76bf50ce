//! Monitor configuration and trigger set construction.
//!
//! Configuration is validated as a whole before anything starts, and the
//! trigger set is built explicitly from it: the returned list is the complete,
//! ordered set the coordinator will own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::action::{MessageTemplate, NotifyAction, SystemHaltAction, TelemetryAction, TimeSeriesAction};
use crate::driver::StatusEndpoint;
use crate::error::{ConfigError, MonitorResult};
use crate::event::{Always, EdgeCrossing, EventHandler, EventTrigger, WorkerConfig};
use crate::sink::http::HttpConfig;
use crate::sink::{KeenIoSink, NotificationSink, TelemetrySink, TimeSeriesSink, WebhookNotifier, XivelySink};

/// Trigger names, in build order.
pub mod names {
    /// Every sample.
    pub const DATA_UPDATED: &str = "data-updated";
    /// Battery voltage falling below the low limit.
    pub const BATTERY_LOW: &str = "battery-low";
    /// Battery voltage reaching the full limit.
    pub const BATTERY_FULL: &str = "battery-full";
    /// Charge current reaching the high limit.
    pub const CHARGE_CURRENT_HIGH: &str = "charge-current-high";
}

/// Default shutdown hook run on low battery.
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "/usr/local/bin/remote_shutdown.sh";

/// Raw sink credentials as given on the command line.
///
/// Each sink needs both halves of its pair; one half alone is a
/// configuration error.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub keenio_project_id: Option<String>,
    pub keenio_write_key: Option<String>,
    pub xively_api_key: Option<String>,
    pub xively_feed_id: Option<String>,
    pub webhook_url: Option<String>,
}

/// Notification texts per trigger.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub battery_low: MessageTemplate,
    pub battery_full: MessageTemplate,
    pub charge_current_high: MessageTemplate,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            battery_low: MessageTemplate::battery_low(),
            battery_full: MessageTemplate::battery_full(),
            charge_current_high: MessageTemplate::charge_current_high(),
        }
    }
}

/// Full monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Charge controller status endpoint.
    pub endpoint: StatusEndpoint,
    /// Request every measurement rather than the basic set.
    pub status_all: bool,
    /// Polling interval.
    pub interval: Duration,
    /// Poll and publish once, then exit.
    pub just_get_status: bool,
    /// Battery voltage below which the low-battery trigger fires.
    pub battery_limit: f64,
    /// Battery voltage at which the battery-full trigger fires.
    pub battery_full_limit: f64,
    /// Charge current at which the charge-current trigger fires; disabled if unset.
    pub charge_current_high: Option<f64>,
    /// Command run on low battery; empty disables it.
    pub shutdown_command: String,
    pub credentials: Credentials,
    pub templates: Templates,
    /// Queue and shutdown settings for every trigger and handler.
    pub worker: WorkerConfig,
    pub http: HttpConfig,
    /// Append log output to this file as well as the console.
    pub log_file: Option<PathBuf>,
    pub debug: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: StatusEndpoint::default(),
            status_all: true,
            interval: Duration::from_secs(300),
            just_get_status: false,
            battery_limit: 11.5,
            battery_full_limit: 28.0,
            charge_current_high: None,
            shutdown_command: DEFAULT_SHUTDOWN_COMMAND.to_string(),
            credentials: Credentials::default(),
            templates: Templates::default(),
            worker: WorkerConfig::default(),
            http: HttpConfig::default(),
            log_file: None,
            debug: false,
        }
    }
}

impl MonitorConfig {
    /// Checks the configuration as a whole.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(self) -> MonitorResult<Self> {
        if self.endpoint.host.trim().is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        if !self.endpoint.path.starts_with('/') {
            return Err(invalid("status_path", format!("must start with '/' (got '{}')", self.endpoint.path)));
        }
        if self.interval.is_zero() {
            return Err(invalid("interval", "must be greater than zero"));
        }
        if self.worker.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be at least 1"));
        }

        check_threshold("battery_limit", self.battery_limit)?;
        check_threshold("battery_full_limit", self.battery_full_limit)?;
        if self.battery_full_limit <= self.battery_limit {
            return Err(invalid(
                "battery_full_limit",
                format!(
                    "must be above battery_limit ({} <= {})",
                    self.battery_full_limit, self.battery_limit
                ),
            ));
        }
        if let Some(current) = self.charge_current_high {
            check_threshold("charge_current_high", current)?;
        }

        self.keenio()?;
        self.xively()?;
        if let Some(url) = self.webhook() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid("webhook_url", format!("must be an http(s) URL (got '{url}')")));
            }
        }

        Ok(self)
    }

    /// Keen IO `(project id, write key)`, if configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::IncompleteCredentials` if only one half is set.
    pub fn keenio(&self) -> MonitorResult<Option<(&str, &str)>> {
        pair(
            "keenio",
            ("project id", self.credentials.keenio_project_id.as_deref()),
            ("write key", self.credentials.keenio_write_key.as_deref()),
        )
    }

    /// Xively `(api key, feed id)`, if configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::IncompleteCredentials` if only one half is set.
    pub fn xively(&self) -> MonitorResult<Option<(&str, &str)>> {
        pair(
            "xively",
            ("api key", self.credentials.xively_api_key.as_deref()),
            ("feed id", self.credentials.xively_feed_id.as_deref()),
        )
    }

    #[must_use]
    pub fn webhook(&self) -> Option<&str> {
        non_empty(self.credentials.webhook_url.as_deref())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> crate::error::MonitorError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn check_threshold(field: &str, value: f64) -> MonitorResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, format!("must be a finite, non-negative number (got {value})")));
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn pair<'a>(
    sink: &str,
    (first_name, first): (&str, Option<&'a str>),
    (second_name, second): (&str, Option<&'a str>),
) -> MonitorResult<Option<(&'a str, &'a str)>> {
    match (non_empty(first), non_empty(second)) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::IncompleteCredentials {
            sink: sink.to_string(),
            missing: second_name.to_string(),
        }
        .into()),
        (None, Some(_)) => Err(ConfigError::IncompleteCredentials {
            sink: sink.to_string(),
            missing: first_name.to_string(),
        }
        .into()),
    }
}

/// The delivery targets available to the trigger set.
#[allow(missing_docs)]
#[derive(Clone, Default)]
pub struct Sinks {
    pub telemetry: Option<Arc<dyn TelemetrySink>>,
    pub time_series: Option<Arc<dyn TimeSeriesSink>>,
    pub notifier: Option<Arc<dyn NotificationSink>>,
}

impl std::fmt::Debug for Sinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinks")
            .field("telemetry", &self.telemetry.as_ref().map(|s| s.name().to_string()))
            .field("time_series", &self.time_series.as_ref().map(|s| s.name().to_string()))
            .field("notifier", &self.notifier.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

impl Sinks {
    /// Builds the bundled HTTP sinks for every configured credential set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for partial credentials, or a delivery
    /// error if an HTTP client cannot be built.
    pub fn from_config(config: &MonitorConfig) -> MonitorResult<Self> {
        let mut sinks = Self::default();

        if let Some((project_id, write_key)) = config.keenio()? {
            sinks.telemetry = Some(Arc::new(KeenIoSink::new(project_id, write_key, &config.http)?));
        }
        if let Some((api_key, feed_id)) = config.xively()? {
            sinks.time_series = Some(Arc::new(XivelySink::new(api_key, feed_id, &config.http)?));
        }
        if let Some(url) = config.webhook() {
            sinks.notifier = Some(Arc::new(WebhookNotifier::new(url, &config.http)?));
        }

        debug!(sinks = ?sinks, "sinks configured");
        Ok(sinks)
    }
}

/// Builds the ordered trigger set.
///
/// Order: data-updated, battery-low, battery-full, charge-current-high.
/// A trigger that would have no handlers is left out.
///
/// # Errors
///
/// Currently only fails if a handler cannot be appended.
pub fn build_triggers(config: &MonitorConfig, sinks: &Sinks) -> MonitorResult<Vec<EventTrigger>> {
    let worker = &config.worker;
    let mut triggers = Vec::new();

    let mut data_updated = EventTrigger::with_config(names::DATA_UPDATED, Always, worker.clone());
    if let Some(sink) = &sinks.telemetry {
        data_updated.append(EventHandler::with_config(TelemetryAction::new(Arc::clone(sink)), worker.clone()))?;
    }
    if let Some(sink) = &sinks.time_series {
        data_updated.append(EventHandler::with_config(TimeSeriesAction::new(Arc::clone(sink)), worker.clone()))?;
    }
    triggers.push(data_updated);

    let mut battery_low = EventTrigger::with_config(
        names::BATTERY_LOW,
        EdgeCrossing::battery_low(config.battery_limit),
        worker.clone(),
    );
    if !config.shutdown_command.trim().is_empty() {
        battery_low.append(EventHandler::with_config(
            SystemHaltAction::new(config.shutdown_command.clone()),
            worker.clone(),
        ))?;
    }
    if let Some(sink) = &sinks.notifier {
        battery_low.append(notify(names::BATTERY_LOW, &config.templates.battery_low, sink, worker))?;
    }
    triggers.push(battery_low);

    if let Some(sink) = &sinks.notifier {
        let mut battery_full = EventTrigger::with_config(
            names::BATTERY_FULL,
            EdgeCrossing::battery_full(config.battery_full_limit),
            worker.clone(),
        );
        battery_full.append(notify(names::BATTERY_FULL, &config.templates.battery_full, sink, worker))?;
        triggers.push(battery_full);

        if let Some(current) = config.charge_current_high {
            let mut current_high = EventTrigger::with_config(
                names::CHARGE_CURRENT_HIGH,
                EdgeCrossing::charge_current_high(current),
                worker.clone(),
            );
            current_high.append(notify(
                names::CHARGE_CURRENT_HIGH,
                &config.templates.charge_current_high,
                sink,
                worker,
            ))?;
            triggers.push(current_high);
        }
    }

    triggers.retain(|t| !t.is_empty());
    info!(
        triggers = ?triggers.iter().map(|t| (t.name().to_string(), t.len())).collect::<Vec<_>>(),
        "trigger set built"
    );
    Ok(triggers)
}

fn notify(
    trigger: &str,
    template: &MessageTemplate,
    sink: &Arc<dyn NotificationSink>,
    worker: &WorkerConfig,
) -> EventHandler {
    EventHandler::with_config(
        NotifyAction::new(format!("{trigger}-notify"), template.clone(), Arc::clone(sink)),
        worker.clone(),
    )
}
