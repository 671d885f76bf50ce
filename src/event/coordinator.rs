//! Dispatch coordinator: the single entry point for publishing samples.
//!
//! The coordinator owns the ordered trigger set, starts and stops it as one
//! unit, and turns the asynchronous workers into a synchronous publish: every
//! trigger gets the sample first, then the coordinator waits for every trigger
//! (and transitively every handler) to finish it. Each level only waits on its
//! direct children, so the outer tick and the inner fan-out never deadlock.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{LifecycleError, MonitorResult};
use crate::sample::Sample;

use super::trigger::EventTrigger;

const NAME: &str = "coordinator";

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Triggers built, nothing running.
    Built,
    /// Triggers running; `publish` allowed.
    Started,
    /// Shutdown in progress.
    Stopping,
    /// Every trigger stopped and joined (or given up on).
    Stopped,
}

/// Result of one publish cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Triggers that accepted and finished the sample.
    pub accepted: usize,
    /// Triggers whose queue rejected the sample.
    pub rejected: usize,
}

/// Owns the trigger set and publishes samples to it.
#[derive(Debug)]
pub struct Coordinator {
    triggers: Vec<EventTrigger>,
    state: CoordinatorState,
}

impl Coordinator {
    /// Wraps an ordered, fully configured trigger set.
    #[must_use]
    pub fn new(triggers: Vec<EventTrigger>) -> Self {
        Self {
            triggers,
            state: CoordinatorState::Built,
        }
    }

    #[must_use]
    pub const fn state(&self) -> CoordinatorState {
        self.state
    }

    #[must_use]
    pub fn triggers(&self) -> &[EventTrigger] {
        &self.triggers
    }

    /// Starts every trigger (and through them every handler).
    ///
    /// If any trigger fails to start, the ones already started are shut down
    /// again and the coordinator ends up `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless freshly built, or the start failure.
    pub fn start_all(&mut self) -> MonitorResult<()> {
        match self.state {
            CoordinatorState::Built => {}
            CoordinatorState::Started | CoordinatorState::Stopping => {
                return Err(LifecycleError::AlreadyStarted { name: NAME.to_string() }.into());
            }
            CoordinatorState::Stopped => {
                return Err(LifecycleError::AlreadyStopped { name: NAME.to_string() }.into());
            }
        }

        for idx in 0..self.triggers.len() {
            if let Err(err) = self.triggers[idx].start() {
                warn!(trigger = %self.triggers[idx].name(), error = %err, "failed to start trigger");
                self.state = CoordinatorState::Started;
                self.shutdown(&(0..=idx).collect::<Vec<_>>());
                return Err(err);
            }
        }

        self.state = CoordinatorState::Started;
        info!(triggers = self.triggers.len(), "trigger set started");
        Ok(())
    }

    /// Publishes one sample to every trigger and waits for all of them.
    ///
    /// A trigger whose queue is full is logged and skipped; the others still
    /// receive the sample.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless the trigger set is started.
    pub fn publish(&self, sample: impl Into<Arc<Sample>>) -> MonitorResult<PublishSummary> {
        match self.state {
            CoordinatorState::Started => {}
            CoordinatorState::Built => {
                return Err(LifecycleError::NotStarted { name: NAME.to_string() }.into());
            }
            CoordinatorState::Stopping | CoordinatorState::Stopped => {
                return Err(LifecycleError::AlreadyStopped { name: NAME.to_string() }.into());
            }
        }

        let sample: Arc<Sample> = sample.into();
        let mut summary = PublishSummary::default();
        let mut accepted = Vec::with_capacity(self.triggers.len());

        for trigger in &self.triggers {
            match trigger.enqueue(Arc::clone(&sample)) {
                Ok(()) => accepted.push(trigger),
                Err(err) => {
                    summary.rejected += 1;
                    warn!(trigger = %trigger.name(), sample = %sample.id(), error = %err, "trigger rejected sample");
                }
            }
        }

        for trigger in accepted {
            match trigger.drain() {
                Ok(()) => summary.accepted += 1,
                Err(err) => {
                    warn!(trigger = %trigger.name(), sample = %sample.id(), error = %err, "trigger drain failed");
                }
            }
        }

        debug!(
            sample = %sample.id(),
            accepted = summary.accepted,
            rejected = summary.rejected,
            "sample published"
        );
        Ok(summary)
    }

    /// Stops and joins every trigger, then every handler.
    ///
    /// Join timeouts are logged, not escalated: shutdown always completes
    /// and the coordinator ends up `Stopped`. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for lifecycle symmetry.
    pub fn stop_all(&mut self) -> MonitorResult<()> {
        match self.state {
            CoordinatorState::Started => {
                let all: Vec<usize> = (0..self.triggers.len()).collect();
                self.shutdown(&all);
                info!("trigger set stopped");
            }
            CoordinatorState::Built | CoordinatorState::Stopping | CoordinatorState::Stopped => {
                self.state = CoordinatorState::Stopped;
            }
        }
        Ok(())
    }

    fn shutdown(&mut self, indices: &[usize]) {
        self.state = CoordinatorState::Stopping;

        for &idx in indices {
            let trigger = &mut self.triggers[idx];
            if let Err(err) = trigger.stop() {
                warn!(trigger = %trigger.name(), error = %err, "failed to stop trigger");
            }
        }
        for &idx in indices {
            let trigger = &mut self.triggers[idx];
            if let Err(err) = trigger.join() {
                warn!(trigger = %trigger.name(), error = %err, "trigger did not shut down cleanly");
            }
        }

        self.state = CoordinatorState::Stopped;
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.state == CoordinatorState::Started {
            let all: Vec<usize> = (0..self.triggers.len()).collect();
            self.shutdown(&all);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::event::condition::{Always, EdgeCrossing};
    use crate::event::handler::testing::Recorder;
    use crate::event::handler::EventHandler;
    use crate::event::worker::{WorkerConfig, WorkerState};
    use crate::sample::BATTERY_VOLTAGE;

    fn battery(value: f64) -> Sample {
        Sample::builder("solar")
            .measurement(BATTERY_VOLTAGE, "Battery", value, "V")
            .build()
    }

    fn trigger_with(name: &str, recorder: &Recorder) -> EventTrigger {
        let mut trigger = EventTrigger::new(name, Always);
        trigger.append(EventHandler::new(recorder.clone())).unwrap();
        trigger
    }

    #[test]
    fn publish_reaches_every_trigger_before_returning() {
        let a = Recorder::named("a");
        let b = Recorder::named("b");
        let mut coordinator = Coordinator::new(vec![trigger_with("t1", &a), trigger_with("t2", &b)]);
        coordinator.start_all().unwrap();

        for v in [12.0, 12.1, 12.2] {
            let summary = coordinator.publish(battery(v)).unwrap();
            assert_eq!(summary, PublishSummary { accepted: 2, rejected: 0 });
        }
        assert_eq!(a.count(), 3);
        assert_eq!(b.count(), 3);

        coordinator.stop_all().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert!(coordinator.triggers().iter().all(|t| t.state() == WorkerState::Terminated));
    }

    #[test]
    fn edge_state_persists_across_ticks() {
        let low = Recorder::named("low");
        let mut trigger = EventTrigger::new("battery-low", EdgeCrossing::battery_low(11.5));
        trigger.append(EventHandler::new(low.clone())).unwrap();
        let mut coordinator = Coordinator::new(vec![trigger]);
        coordinator.start_all().unwrap();

        for v in [12.0, 11.4, 11.3, 11.6, 11.2] {
            coordinator.publish(battery(v)).unwrap();
        }
        assert_eq!(low.count(), 2);

        coordinator.stop_all().unwrap();
    }

    #[test]
    fn publish_requires_started_trigger_set() {
        let mut coordinator = Coordinator::new(Vec::new());
        assert!(coordinator.publish(battery(12.0)).unwrap_err().is_lifecycle());

        coordinator.start_all().unwrap();
        assert_eq!(coordinator.publish(battery(12.0)).unwrap(), PublishSummary::default());

        coordinator.stop_all().unwrap();
        assert!(coordinator.publish(battery(12.0)).unwrap_err().is_lifecycle());
    }

    #[test]
    fn start_all_twice_is_a_lifecycle_error() {
        let mut coordinator = Coordinator::new(vec![EventTrigger::new("t", Always)]);
        coordinator.start_all().unwrap();
        assert!(coordinator.start_all().unwrap_err().is_lifecycle());
        coordinator.stop_all().unwrap();
        coordinator.stop_all().unwrap();
        assert!(coordinator.start_all().unwrap_err().is_lifecycle());
    }

    /// Signals when it starts, then blocks until released.
    struct Stuck {
        entered: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
    }

    impl crate::event::handler::Action for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        fn run(&mut self, _sample: &Sample) -> MonitorResult<()> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(())
        }
    }

    #[test]
    fn stop_all_completes_despite_a_stuck_handler() {
        let timeout = std::time::Duration::from_millis(100);
        let config = WorkerConfig {
            join_timeout: timeout,
            ..WorkerConfig::default()
        };
        let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        let mut trigger = EventTrigger::with_config("data-updated", Always, config.clone());
        trigger
            .append(EventHandler::with_config(
                Stuck {
                    entered: entered_tx,
                    release: release_rx,
                },
                config,
            ))
            .unwrap();
        let mut coordinator = Coordinator::new(vec![trigger]);
        coordinator.start_all().unwrap();

        // Park the handler's consumer inside its action.
        coordinator.triggers()[0].handlers()[0].enqueue(battery(12.0)).unwrap();
        entered_rx.recv().unwrap();

        let started = std::time::Instant::now();
        assert_eq!(coordinator.stop_all(), Ok(()));
        let elapsed = started.elapsed();

        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert!(elapsed < timeout * 10, "stop_all took {elapsed:?}");
        assert_eq!(coordinator.triggers()[0].state(), WorkerState::Terminated);

        release_tx.send(()).unwrap();
    }

    #[test]
    fn full_trigger_queue_is_reported_not_fatal() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let blocked = EventTrigger::with_config(
            "blocked",
            move |_: &Sample| -> MonitorResult<bool> {
                let _ = gate_rx.recv();
                Ok(false)
            },
            WorkerConfig {
                queue_capacity: 1,
                ..WorkerConfig::default()
            },
        );
        let other = Recorder::named("other");
        let mut coordinator = Coordinator::new(vec![blocked, trigger_with("other", &other)]);
        coordinator.start_all().unwrap();

        // First sample parks the consumer in its condition, second fills the queue.
        coordinator.triggers()[0].enqueue(battery(12.0)).unwrap();
        while coordinator.triggers()[0].enqueue(battery(12.1)).is_err() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let summary = coordinator.publish(battery(12.2)).unwrap();
        assert_eq!(summary, PublishSummary { accepted: 1, rejected: 1 });
        assert_eq!(other.count(), 1);

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        coordinator.stop_all().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
    }
}
