//! Error types for solar-monitor.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! specific condition (a full queue, a lifecycle misuse, a failed delivery)
//! instead of inspecting strings.

use thiserror::Error;

/// Errors raised by a worker queue or its consumer thread.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Queue of worker '{worker}' is full (capacity: {capacity})")]
    QueueFull {
        worker: String,
        capacity: usize,
    },

    #[error("Invalid argument for worker '{worker}': {reason}")]
    InvalidArgument {
        worker: String,
        reason: String,
    },

    #[error("Worker '{worker}' is stopped and no longer accepts items")]
    Stopped {
        worker: String,
    },

    #[error("Worker '{worker}' did not terminate within {timeout_ms}ms")]
    JoinTimeout {
        worker: String,
        timeout_ms: u64,
    },

    #[error("Failed to spawn worker '{worker}': {message}")]
    Spawn {
        worker: String,
        message: String,
    },
}

/// Lifecycle misuse of a worker, trigger, coordinator or timer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("'{name}' is already started")]
    AlreadyStarted {
        name: String,
    },

    #[error("'{name}' has not been started yet")]
    NotStarted {
        name: String,
    },

    #[error("'{name}' is already stopped")]
    AlreadyStopped {
        name: String,
    },
}

/// Configuration errors detected before anything is started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Incomplete credentials for {sink}: missing {missing}")]
    IncompleteCredentials {
        sink: String,
        missing: String,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

/// Errors reading a sample.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("Measurement '{name}' is missing from the sample")]
    MissingMeasurement {
        name: String,
    },
}

/// Errors delivering a sample to an external sink or running a local command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("HTTP request to {sink} failed: {message}")]
    Http {
        sink: String,
        message: String,
    },

    #[error("{sink} responded with status {code}")]
    Status {
        sink: String,
        code: u16,
    },

    #[error("Command '{command}' failed: {message}")]
    Command {
        command: String,
        message: String,
    },

    #[error("Failed to serialize payload: {message}")]
    Serialization {
        message: String,
    },
}

/// Errors reported by the status driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Charge controller at {host} is unreachable: {message}")]
    Unreachable {
        host: String,
        message: String,
    },

    #[error("Malformed status response: {message}")]
    Malformed {
        message: String,
    },
}

/// Top-level error type for solar-monitor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sample error: {0}")]
    Sample(#[from] SampleError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl MonitorError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a lifecycle misuse.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }

    /// Returns true if a worker queue rejected an item because it was full.
    #[must_use]
    pub const fn is_queue_full(&self) -> bool {
        matches!(self, Self::Worker(WorkerError::QueueFull { .. }))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if the failure is transient and the next tick may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Worker(e) => matches!(e, WorkerError::QueueFull { .. }),
            Self::Delivery(e) => match e {
                DeliveryError::Http { .. } => true,
                DeliveryError::Status { code, .. } => *code >= 500,
                _ => false,
            },
            Self::Driver(e) => matches!(e, DriverError::Unreachable { .. }),
            Self::Lifecycle(_) | Self::Config(_) | Self::Sample(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for solar-monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
