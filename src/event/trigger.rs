//! Event triggers: condition-gated fan-out to handlers.
//!
//! A trigger is a worker whose per-item hook evaluates its condition and, on a
//! match, pushes the sample to every registered handler before waiting for all
//! of them. Handlers run concurrently with each other; the trigger's own item is
//! only complete once every handler has drained it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{LifecycleError, MonitorResult};
use crate::sample::Sample;

use super::condition::Condition;
use super::handler::EventHandler;
use super::worker::{Message, Process, Worker, WorkerConfig, WorkerHandle, WorkerState};

struct FanOut {
    name: String,
    condition: Option<Box<dyn Condition>>,
    handlers: Vec<WorkerHandle>,
}

impl Process for FanOut {
    fn process(&mut self, sample: &Arc<Sample>) -> MonitorResult<()> {
        let Some(condition) = self.condition.as_mut() else {
            debug!(trigger = %self.name, "no condition configured; sample ignored");
            return Ok(());
        };

        let fired = condition.evaluate(sample)?;
        debug!(trigger = %self.name, fired, at = %sample.timestamp(), "condition evaluated");
        if !fired {
            return Ok(());
        }

        let mut accepted = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            match handler.enqueue(Arc::clone(sample)) {
                Ok(()) => accepted.push(handler),
                Err(err) => {
                    warn!(trigger = %self.name, handler = %handler.name(), error = %err, "handler rejected sample");
                }
            }
        }
        for handler in accepted {
            if let Err(err) = handler.drain() {
                warn!(trigger = %self.name, handler = %handler.name(), error = %err, "handler drain failed");
            }
        }
        Ok(())
    }
}

/// A worker gating fan-out to its handlers behind a [`Condition`].
pub struct EventTrigger {
    worker: Worker,
    condition: Option<Box<dyn Condition>>,
    handlers: Vec<EventHandler>,
}

impl std::fmt::Debug for EventTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTrigger")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl EventTrigger {
    /// Creates a trigger with the default worker configuration.
    pub fn new(name: impl Into<String>, condition: impl Condition) -> Self {
        Self::with_config(name, condition, WorkerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, condition: impl Condition, config: WorkerConfig) -> Self {
        Self {
            worker: Worker::new(name, config),
            condition: Some(Box::new(condition)),
            handlers: Vec::new(),
        }
    }

    /// Creates a trigger without a condition. It consumes samples but never
    /// invokes its handlers.
    pub fn unconditioned(name: impl Into<String>, config: WorkerConfig) -> Self {
        Self {
            worker: Worker::new(name, config),
            condition: None,
            handlers: Vec::new(),
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

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    #[must_use]
    pub fn handlers(&self) -> &[EventHandler] {
        &self.handlers
    }

    /// Registers a handler. Handlers are invoked in registration order.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::AlreadyStarted` once the trigger is running.
    pub fn append(&mut self, handler: EventHandler) -> MonitorResult<()> {
        if self.worker.state() != WorkerState::Created {
            return Err(LifecycleError::AlreadyStarted {
                name: self.name().to_string(),
            }
            .into());
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// Starts every handler, then the trigger's own worker.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error if already started, or the first start failure.
    pub fn start(&mut self) -> MonitorResult<()> {
        if self.worker.state() != WorkerState::Created {
            return Err(LifecycleError::AlreadyStarted {
                name: self.name().to_string(),
            }
            .into());
        }

        for handler in &mut self.handlers {
            handler.start()?;
        }

        let fan_out = FanOut {
            name: self.name().to_string(),
            condition: self.condition.take(),
            handlers: self.handlers.iter().map(EventHandler::handle).collect(),
        };
        self.worker.start(fan_out)
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

    /// Asks the trigger's worker to exit after its queued samples.
    ///
    /// Handlers keep running until [`EventTrigger::join`] so that samples
    /// still being fanned out reach them.
    ///
    /// # Errors
    ///
    /// See [`Worker::stop`].
    pub fn stop(&mut self) -> MonitorResult<()> {
        self.worker.stop()
    }

    /// Joins the trigger's worker, then stops and joins every handler.
    ///
    /// Handlers are shut down even if the trigger's own join timed out.
    ///
    /// # Errors
    ///
    /// Returns the trigger's join failure, else the first handler failure.
    pub fn join(&mut self) -> MonitorResult<()> {
        let own = self.worker.join();

        let mut first_err = None;
        for handler in &mut self.handlers {
            if handler.state() == WorkerState::Created {
                continue;
            }
            if let Err(err) = handler.stop() {
                warn!(trigger = %self.worker.name(), handler = %handler.name(), error = %err, "failed to stop handler");
                first_err.get_or_insert(err);
            }
        }
        for handler in &mut self.handlers {
            if handler.state() == WorkerState::Created {
                continue;
            }
            if let Err(err) = handler.join() {
                warn!(trigger = %self.worker.name(), handler = %handler.name(), error = %err, "failed to join handler");
                first_err.get_or_insert(err);
            }
        }

        own?;
        first_err.map_or(Ok(()), Err)
    }
}
