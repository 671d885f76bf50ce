//! Actions run by event handlers.

/// Telemetry and time-series delivery.
pub mod cloud;
/// Templated notifications.
pub mod notify;
/// Local command execution.
pub mod system_halt;

pub use cloud::{TelemetryAction, TimeSeriesAction};
pub use notify::{MessageTemplate, NotifyAction};
pub use system_halt::{CommandOutput, CommandRunner, ProcessRunner, SystemHaltAction};
