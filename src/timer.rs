//! Fixed-interval recurring calls on a dedicated thread.
//!
//! Ticks are measured as elapsed intervals since `start`, best effort. A tick
//! that arrives while the previous call is still running is coalesced rather
//! than queued, so a slow call never causes a burst afterwards.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, LifecycleError, MonitorResult, WorkerError};

const NAME: &str = "recurring-timer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Running,
    Cancelled,
}

/// Calls a function every `interval` until cancelled.
#[derive(Debug)]
pub struct RecurringTimer {
    interval: Duration,
    state: TimerState,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RecurringTimer {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: TimerState::Idle,
            stop: None,
            thread: None,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// True while the timer thread is running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Starts calling `f` every interval. The first call happens one
    /// interval after `start`.
    ///
    /// Errors and panics from `f` are logged; the next tick still runs.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::AlreadyStarted` / `AlreadyStopped` unless idle.
    /// - `ConfigError::InvalidValue` for a zero interval.
    /// - `WorkerError::Spawn` if the thread cannot be created.
    pub fn start<F>(&mut self, f: F) -> MonitorResult<()>
    where
        F: FnMut() -> MonitorResult<()> + Send + 'static,
    {
        match self.state {
            TimerState::Idle => {}
            TimerState::Running => {
                return Err(LifecycleError::AlreadyStarted { name: NAME.to_string() }.into());
            }
            TimerState::Cancelled => {
                return Err(LifecycleError::AlreadyStopped { name: NAME.to_string() }.into());
            }
        }
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "interval".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name(NAME.to_string())
            .spawn(move || run(interval, &stop_rx, f))
            .map_err(|e| WorkerError::Spawn {
                worker: NAME.to_string(),
                message: e.to_string(),
            })?;

        self.stop = Some(stop_tx);
        self.thread = Some(handle);
        self.state = TimerState::Running;
        info!(interval_secs = interval.as_secs_f64(), "timer started");
        Ok(())
    }

    /// Stops the timer and waits for an in-progress call to return.
    ///
    /// Cancelling twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NotStarted` if the timer was never started.
    pub fn cancel(&mut self) -> MonitorResult<()> {
        match self.state {
            TimerState::Idle => {
                return Err(LifecycleError::NotStarted { name: NAME.to_string() }.into());
            }
            TimerState::Cancelled => return Ok(()),
            TimerState::Running => {}
        }

        // Disconnecting the stop channel wakes the select.
        drop(self.stop.take());
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("timer thread panicked");
            }
        }
        self.state = TimerState::Cancelled;
        info!("timer cancelled");
        Ok(())
    }
}

impl Drop for RecurringTimer {
    fn drop(&mut self) {
        if self.state == TimerState::Running {
            let _ = self.cancel();
        }
    }
}

fn run<F>(interval: Duration, stop: &Receiver<()>, mut f: F)
where
    F: FnMut() -> MonitorResult<()>,
{
    let ticker = tick(interval);
    let mut ticks: u64 = 0;

    loop {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                ticks += 1;
                match panic::catch_unwind(AssertUnwindSafe(&mut f)) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => debug!(tick = ticks, error = %err, "timer callback failed"),
                    Err(_) => warn!(tick = ticks, "timer callback panicked"),
                }
            }
        }
    }

    debug!(ticks, "timer loop exited");
}
