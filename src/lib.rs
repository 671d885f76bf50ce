//! # solar-monitor
//!
//! Periodically samples a solar charge controller and dispatches every sample
//! through a small event framework: condition-gated triggers fan samples out
//! to handlers that deliver telemetry, post notifications or run local hooks.
//!
//! ## Core Concepts
//!
//! - **Sample**: one immutable snapshot of named measurements with a timestamp
//! - **Worker**: one thread consuming one bounded FIFO queue
//! - **EventTrigger**: a worker evaluating a condition and fanning out on match
//! - **EventHandler**: a leaf worker performing one external effect
//! - **Coordinator**: owns the trigger set and publishes samples to it
//!
//! ## Usage
//!
//! ```rust,no_run
//! use solar_monitor::{build_triggers, Coordinator, MonitorConfig, Sample, Sinks};
//!
//! # fn main() -> solar_monitor::MonitorResult<()> {
//! let config = MonitorConfig::default().validate()?;
//! let sinks = Sinks::from_config(&config)?;
//! let mut coordinator = Coordinator::new(build_triggers(&config, &sinks)?);
//! coordinator.start_all()?;
//!
//! let sample = Sample::builder("solar")
//!     .measurement("Battery Voltage", "Battery", 11.2, "V")
//!     .build();
//! coordinator.publish(sample)?;
//!
//! coordinator.stop_all()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod sample;

// Dispatch core
pub mod event;

// Effects and collaborators
pub mod action;
pub mod driver;
pub mod sink;

// Application wiring
pub mod config;
pub mod logging;
pub mod poll;
pub mod timer;

pub use config::{build_triggers, Credentials, MonitorConfig, Sinks, Templates};
pub use driver::{HttpStatusDriver, StatusDriver, StatusEndpoint};
pub use error::{
    ConfigError, DeliveryError, DriverError, LifecycleError, MonitorError, MonitorResult, SampleError, WorkerError,
};
pub use event::{
    Action, Always, Condition, Coordinator, CoordinatorState, Edge, EdgeCrossing, EventHandler, EventTrigger,
    PublishSummary, WorkerConfig, WorkerState,
};
pub use poll::Poller;
pub use sample::{Measurement, Measurements, Sample, SampleId};
pub use timer::RecurringTimer;
