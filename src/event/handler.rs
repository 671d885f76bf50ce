//! Event handlers: leaf workers performing one external effect per sample.

use std::sync::Arc;

use crate::error::{LifecycleError, MonitorResult};
use crate::sample::Sample;

use super::worker::{Message, Process, Worker, WorkerConfig, WorkerHandle, WorkerState};

/// The externally visible effect of a handler.
///
/// `run` is called once per received sample on the handler's own thread.
/// Errors are logged and swallowed by the worker loop; the handler stays
/// alive for the next tick.
pub trait Action: Send + 'static {
    /// Short name used for the worker thread and log lines.
    fn name(&self) -> &str;

    /// Performs the effect for one sample.
    ///
    /// # Errors
    ///
    /// Returns the delivery or command failure, if any.
    fn run(&mut self, sample: &Sample) -> MonitorResult<()>;
}

struct RunAction(Box<dyn Action>);

impl Process for RunAction {
    fn process(&mut self, sample: &Arc<Sample>) -> MonitorResult<()> {
        self.0.run(sample)
    }
}

/// A worker wrapping a single [`Action`].
pub struct EventHandler {
    worker: Worker,
    action: Option<Box<dyn Action>>,
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl EventHandler {
    /// Creates a handler with the default worker configuration.
    pub fn new(action: impl Action) -> Self {
        Self::with_config(action, WorkerConfig::default())
    }

    pub fn with_config(action: impl Action, config: WorkerConfig) -> Self {
        let worker = Worker::new(action.name().to_string(), config);
        Self {
            worker,
            action: Some(Box::new(action)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.worker.name()
    }

    #[must_use]
    pub const fn state(&self) -> WorkerState {
        self.worker.state()
    }

    #[must_use]
    pub fn handle(&self) -> WorkerHandle {
        self.worker.handle()
    }

    /// Starts the handler thread.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error if already started, or a spawn failure.
    pub fn start(&mut self) -> MonitorResult<()> {
        if self.worker.state() != WorkerState::Created {
            return Err(LifecycleError::AlreadyStarted {
                name: self.name().to_string(),
            }
            .into());
        }
        let action = self.action.take().ok_or_else(|| LifecycleError::AlreadyStarted {
            name: self.name().to_string(),
        })?;
        self.worker.start(RunAction(action))
    }

    /// # Errors
    ///
    /// See [`Worker::enqueue`].
    pub fn enqueue(&self, msg: impl Into<Message>) -> MonitorResult<()> {
        self.worker.enqueue(msg)
    }

    /// # Errors
    ///
    /// See [`Worker::drain`].
    pub fn drain(&self) -> MonitorResult<()> {
        self.worker.drain()
    }

    /// # Errors
    ///
    /// See [`Worker::stop`].
    pub fn stop(&mut self) -> MonitorResult<()> {
        self.worker.stop()
    }

    /// # Errors
    ///
    /// See [`Worker::join`].
    pub fn join(&mut self) -> MonitorResult<()> {
        self.worker.join()
    }
}
