use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use solar_monitor::config::DEFAULT_SHUTDOWN_COMMAND;
use solar_monitor::logging::{self, LogOptions};
use solar_monitor::sink::http::HttpConfig;
use solar_monitor::{
    build_triggers, Coordinator, Credentials, HttpStatusDriver, MonitorConfig, Poller, RecurringTimer, Sinks,
    StatusEndpoint, WorkerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "solar-monitor")]
#[command(about = "Monitor a solar charge controller and dispatch its status to sinks and hooks")]
#[command(version)]
struct Cli {
    /// Charge controller host address
    #[arg(short = 'n', long, default_value = "192.168.1.20")]
    host_name: String,

    /// Path of the JSON status document on the controller
    #[arg(long, default_value = "/status.json")]
    status_path: String,

    /// Keen IO project id
    #[arg(long, env = "KEENIO_PROJECT_ID")]
    keenio_project_id: Option<String>,

    /// Keen IO write key
    #[arg(long, env = "KEENIO_WRITE_KEY", hide_env_values = true)]
    keenio_write_key: Option<String>,

    /// Xively API key
    #[arg(long, env = "XIVELY_API_KEY", hide_env_values = true)]
    xively_api_key: Option<String>,

    /// Xively feed id
    #[arg(long, env = "XIVELY_FEED_ID")]
    xively_feed_id: Option<String>,

    /// Webhook receiving battery and charge notifications
    #[arg(long, env = "SOLAR_MONITOR_WEBHOOK_URL", hide_env_values = true)]
    webhook_url: Option<String>,

    /// Battery voltage limit, e.g. 11.5
    #[arg(short = 'b', long, default_value_t = 11.5)]
    battery_limit: f64,

    /// Battery voltage regarded as fully charged
    #[arg(long, default_value_t = 28.0)]
    battery_full_limit: f64,

    /// Charge current regarded as high; disabled if not given
    #[arg(long)]
    charge_current_high: Option<f64>,

    /// Command run when the battery voltage falls below the limit; empty disables it
    #[arg(short = 's', long, default_value = DEFAULT_SHUTDOWN_COMMAND)]
    battery_limit_hook_script: String,

    /// Polling interval in seconds
    #[arg(short, long, default_value_t = 300)]
    interval: u64,

    /// Log file path to append to
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Poll and dispatch once, then exit
    #[arg(long)]
    just_get_status: bool,

    /// Request only the basic status set instead of every measurement
    #[arg(long)]
    basic_status: bool,

    /// Queue capacity of every trigger and handler
    #[arg(long, default_value_t = 5)]
    queue_capacity: usize,

    /// Seconds to wait for each worker on shutdown
    #[arg(long, default_value_t = 5)]
    shutdown_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 10)]
    http_timeout: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn into_config(self) -> MonitorConfig {
        let shutdown_timeout = Duration::from_secs(self.shutdown_timeout);
        MonitorConfig {
            endpoint: StatusEndpoint {
                host: self.host_name,
                path: self.status_path,
            },
            status_all: !self.basic_status,
            interval: Duration::from_secs(self.interval),
            just_get_status: self.just_get_status,
            battery_limit: self.battery_limit,
            battery_full_limit: self.battery_full_limit,
            charge_current_high: self.charge_current_high,
            shutdown_command: self.battery_limit_hook_script,
            credentials: Credentials {
                keenio_project_id: self.keenio_project_id,
                keenio_write_key: self.keenio_write_key,
                xively_api_key: self.xively_api_key,
                xively_feed_id: self.xively_feed_id,
                webhook_url: self.webhook_url,
            },
            worker: WorkerConfig {
                queue_capacity: self.queue_capacity,
                join_timeout: shutdown_timeout,
                stop_timeout: shutdown_timeout,
            },
            http: HttpConfig {
                timeout: Duration::from_secs(self.http_timeout),
                ..HttpConfig::default()
            },
            log_file: self.log_file,
            debug: self.debug,
            ..MonitorConfig::default()
        }
    }
}

fn main() -> Result<()> {
    let config = Cli::parse().into_config();

    logging::init(&LogOptions {
        debug: config.debug,
        file: config.log_file.clone(),
    });

    let config = config.validate().context("invalid configuration")?;
    let sinks = Sinks::from_config(&config).context("failed to set up sinks")?;
    let triggers = build_triggers(&config, &sinks)?;
    let driver = HttpStatusDriver::new(config.endpoint.clone(), &config.http)?;
    let mut poller = Poller::new(driver, config.status_all);

    let mut coordinator = Coordinator::new(triggers);
    coordinator.start_all().context("failed to start triggers")?;

    if config.just_get_status {
        let summary = poller.tick(&coordinator)?;
        info!(summary = ?summary, "single status cycle finished");
        coordinator.stop_all()?;
        return Ok(());
    }

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("failed to install signal handler")?;

    let coordinator = Arc::new(Mutex::new(coordinator));
    let ticking = Arc::clone(&coordinator);
    let mut timer = RecurringTimer::new(config.interval);
    timer.start(move || {
        let coordinator = ticking.lock().unwrap_or_else(PoisonError::into_inner);
        poller.tick(&coordinator).map(|_| ())
    })?;

    info!(host = %config.endpoint.host, interval_secs = config.interval.as_secs(), "monitoring");
    if stop_rx.recv().is_err() {
        warn!("signal handler dropped; shutting down");
    }
    info!("shutdown requested");

    timer.cancel()?;
    coordinator
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .stop_all()?;
    info!("stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_monitor_config() {
        let config = Cli::try_parse_from(["solar-monitor"]).unwrap().into_config();
        let defaults = MonitorConfig::default();

        assert_eq!(config.endpoint, defaults.endpoint);
        assert_eq!(config.interval, defaults.interval);
        assert_eq!(config.battery_limit, defaults.battery_limit);
        assert_eq!(config.battery_full_limit, defaults.battery_full_limit);
        assert_eq!(config.shutdown_command, defaults.shutdown_command);
        assert_eq!(config.worker.queue_capacity, defaults.worker.queue_capacity);
        assert!(config.status_all);
        assert!(!config.just_get_status);
    }

    #[test]
    fn flags_map_onto_config() {
        let config = Cli::try_parse_from([
            "solar-monitor",
            "-n",
            "10.0.0.7",
            "--keenio-project-id",
            "proj",
            "--keenio-write-key",
            "key",
            "-b",
            "12.0",
            "--charge-current-high",
            "20",
            "-i",
            "60",
            "--just-get-status",
            "--basic-status",
            "-s",
            "",
        ])
        .unwrap()
        .into_config();

        assert_eq!(config.endpoint.host, "10.0.0.7");
        assert_eq!(config.credentials.keenio_project_id.as_deref(), Some("proj"));
        assert_eq!(config.battery_limit, 12.0);
        assert_eq!(config.charge_current_high, Some(20.0));
        assert_eq!(config.interval, Duration::from_secs(60));
        assert!(config.just_get_status);
        assert!(!config.status_all);
        assert!(config.shutdown_command.is_empty());
    }

    #[test]
    fn invalid_values_are_usage_errors() {
        assert!(Cli::try_parse_from(["solar-monitor", "-b", "low"]).is_err());
        assert!(Cli::try_parse_from(["solar-monitor", "-i", "-5"]).is_err());
    }
}
