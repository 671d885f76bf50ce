//! Single-consumer worker threads backed by a bounded queue.
//!
//! Every trigger and handler runs on one `Worker`: a dedicated thread popping
//! `Message`s from a bounded crossbeam channel. Producers never block on
//! `enqueue` (a full queue is reported as `WorkerError::QueueFull`), and
//! `drain` gives callers a synchronous-looking publish/await cycle on top of
//! the asynchronous consumer.
//!
//! Shutdown is message based: `stop` pushes `Message::Shutdown`, the consumer
//! finishes everything queued before it and exits, and `join` waits for the
//! thread with a bounded timeout.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, MonitorError, MonitorResult, WorkerError};
use crate::sample::Sample;

/// Item carried by a worker queue.
#[derive(Debug, Clone)]
pub enum Message {
    /// A sample to process.
    Sample(Arc<Sample>),
    /// Ends the consumer loop. Only `Worker::stop` may send it.
    Shutdown,
}

impl From<Arc<Sample>> for Message {
    fn from(sample: Arc<Sample>) -> Self {
        Self::Sample(sample)
    }
}

impl From<Sample> for Message {
    fn from(sample: Sample) -> Self {
        Self::Sample(Arc::new(sample))
    }
}

/// Per-item hook run on the worker thread.
///
/// Errors are logged by the consumer loop and never end it.
pub trait Process: Send + 'static {
    /// Processes one sample.
    fn process(&mut self, sample: &Arc<Sample>) -> MonitorResult<()>;
}

impl<F> Process for F
where
    F: FnMut(&Arc<Sample>) -> MonitorResult<()> + Send + 'static,
{
    fn process(&mut self, sample: &Arc<Sample>) -> MonitorResult<()> {
        self(sample)
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max queued items before `enqueue` reports `QueueFull`.
    pub queue_capacity: usize,
    /// How long `join` waits for the consumer thread to exit.
    pub join_timeout: Duration,
    /// How long `stop` waits for room in a full queue to push the shutdown message.
    pub stop_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            join_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Built, consumer not running yet. Items may already be queued.
    Created,
    /// Consumer thread is running.
    Running,
    /// Shutdown message sent, consumer finishing queued items.
    Stopping,
    /// Consumer thread has exited and was joined.
    Terminated,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Items sent but not yet fully processed (shutdown message included).
    pending: usize,
    started: bool,
    shutdown_requested: bool,
    /// Consumer has exited; nothing queued will ever be processed.
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<QueueState>,
    drained: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete_one(&self) {
        let mut st = self.lock();
        st.pending = st.pending.saturating_sub(1);
        if st.pending == 0 {
            self.drained.notify_all();
        }
    }
}

/// Marks the queue closed when the consumer thread exits, even by unwinding,
/// so `drain` callers are never left waiting on a dead consumer.
struct CloseOnExit(Arc<Shared>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        let mut st = self.0.lock();
        st.closed = true;
        st.pending = 0;
        self.0.drained.notify_all();
    }
}

/// Cloneable producer side of a worker: enqueue and drain.
///
/// Triggers hold handles to their handlers so the trigger thread can fan out
/// while the owner keeps the lifecycle (`start`/`stop`/`join`).
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    name: Arc<str>,
    tx: Sender<Message>,
    shared: Arc<Shared>,
    capacity: usize,
}

impl WorkerHandle {
    /// Worker name (also the consumer thread name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items enqueued but not yet processed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.lock().pending
    }

    /// Non-blocking enqueue.
    ///
    /// # Errors
    ///
    /// - `WorkerError::InvalidArgument` if `msg` is `Message::Shutdown`.
    /// - `WorkerError::QueueFull` if the queue is at capacity.
    /// - `WorkerError::Stopped` once `stop` was requested or the consumer exited.
    pub fn enqueue(&self, msg: impl Into<Message>) -> MonitorResult<()> {
        let Message::Sample(sample) = msg.into() else {
            return Err(WorkerError::InvalidArgument {
                worker: self.name.to_string(),
                reason: "the shutdown message is reserved for stop()".to_string(),
            }
            .into());
        };

        // Held across try_send so the consumer cannot complete an item before
        // it is counted, and stop() cannot slip in between check and send.
        let mut st = self.shared.lock();
        if st.shutdown_requested || st.closed {
            return Err(self.stopped());
        }

        match self.tx.try_send(Message::Sample(sample)) {
            Ok(()) => {
                st.pending += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(WorkerError::QueueFull {
                worker: self.name.to_string(),
                capacity: self.capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(self.stopped()),
        }
    }

    /// Blocks until every item enqueued so far has been processed.
    ///
    /// Returns immediately once the consumer has exited.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::NotStarted` if items are queued on a worker
    /// whose consumer was never started (the wait could never finish).
    pub fn drain(&self) -> MonitorResult<()> {
        let mut st = self.shared.lock();
        loop {
            if st.pending == 0 || st.closed {
                return Ok(());
            }
            if !st.started {
                return Err(LifecycleError::NotStarted {
                    name: self.name.to_string(),
                }
                .into());
            }
            st = self
                .shared
                .drained
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn stopped(&self) -> MonitorError {
        WorkerError::Stopped {
            worker: self.name.to_string(),
        }
        .into()
    }
}

/// A single-consumer execution unit: one thread, one bounded FIFO queue.
#[derive(Debug)]
pub struct Worker {
    handle: WorkerHandle,
    config: WorkerConfig,
    rx: Option<Receiver<Message>>,
    thread: Option<JoinHandle<()>>,
    exited: Option<Receiver<()>>,
    state: WorkerState,
}

impl Worker {
    /// Creates a worker. The consumer thread is not spawned until `start`.
    pub fn new(name: impl Into<String>, config: WorkerConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = bounded::<Message>(capacity);
        let name: String = name.into();

        Self {
            handle: WorkerHandle {
                name: Arc::from(name),
                tx,
                shared: Arc::new(Shared::default()),
                capacity,
            },
            config,
            rx: Some(rx),
            thread: None,
            exited: None,
            state: WorkerState::Created,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    #[must_use]
    pub const fn state(&self) -> WorkerState {
        self.state
    }

    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Returns a cloneable producer handle.
    #[must_use]
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Spawns the consumer thread running `process` for every sample.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::AlreadyStarted` / `AlreadyStopped` if not freshly created.
    /// - `WorkerError::Spawn` if the OS refuses the thread.
    pub fn start(&mut self, process: impl Process) -> MonitorResult<()> {
        match self.state {
            WorkerState::Created => {}
            WorkerState::Running | WorkerState::Stopping => {
                return Err(LifecycleError::AlreadyStarted {
                    name: self.name().to_string(),
                }
                .into());
            }
            WorkerState::Terminated => {
                return Err(LifecycleError::AlreadyStopped {
                    name: self.name().to_string(),
                }
                .into());
            }
        }

        let rx = self
            .rx
            .take()
            .ok_or_else(|| MonitorError::internal(format!("worker '{}' lost its queue", self.name())))?;
        let (exit_tx, exit_rx) = bounded::<()>(0);
        let shared = Arc::clone(&self.handle.shared);
        let name = Arc::clone(&self.handle.name);

        let spawned = thread::Builder::new()
            .name(self.name().to_string())
            .spawn(move || consume(&name, &rx, process, shared, exit_tx));

        match spawned {
            Ok(handle) => {
                self.handle.shared.lock().started = true;
                self.thread = Some(handle);
                self.exited = Some(exit_rx);
                self.state = WorkerState::Running;
                debug!(worker = %self.name(), "worker started");
                Ok(())
            }
            Err(e) => {
                self.state = WorkerState::Terminated;
                Err(WorkerError::Spawn {
                    worker: self.name().to_string(),
                    message: e.to_string(),
                }
                .into())
            }
        }
    }

    /// See [`WorkerHandle::enqueue`].
    ///
    /// # Errors
    ///
    /// See [`WorkerHandle::enqueue`].
    pub fn enqueue(&self, msg: impl Into<Message>) -> MonitorResult<()> {
        self.handle.enqueue(msg)
    }

    /// See [`WorkerHandle::drain`].
    ///
    /// # Errors
    ///
    /// See [`WorkerHandle::drain`].
    pub fn drain(&self) -> MonitorResult<()> {
        self.handle.drain()
    }

    /// Asks the consumer to exit after the items already queued.
    ///
    /// Calling `stop` again while stopping or after termination is a no-op.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::NotStarted` if the worker was never started.
    /// - `WorkerError::QueueFull` if the queue stayed full for `stop_timeout`.
    pub fn stop(&mut self) -> MonitorResult<()> {
        match self.state {
            WorkerState::Created => {
                return Err(LifecycleError::NotStarted {
                    name: self.name().to_string(),
                }
                .into());
            }
            WorkerState::Stopping | WorkerState::Terminated => return Ok(()),
            WorkerState::Running => {}
        }

        {
            let mut st = self.handle.shared.lock();
            st.shutdown_requested = true;
            st.pending += 1;
        }

        match self.handle.tx.send_timeout(Message::Shutdown, self.config.stop_timeout) {
            Ok(()) => {
                self.state = WorkerState::Stopping;
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                let mut st = self.handle.shared.lock();
                st.shutdown_requested = false;
                st.pending = st.pending.saturating_sub(1);
                if st.pending == 0 {
                    self.handle.shared.drained.notify_all();
                }
                Err(WorkerError::QueueFull {
                    worker: self.name().to_string(),
                    capacity: self.handle.capacity,
                }
                .into())
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                // Consumer already gone; nothing left to signal.
                self.handle.shared.complete_one();
                self.state = WorkerState::Stopping;
                Ok(())
            }
        }
    }

    /// Waits up to `join_timeout` for the consumer thread to exit.
    ///
    /// Joining an already joined worker is a no-op.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::NotStarted` if the worker was never started.
    /// - `WorkerError::JoinTimeout` if the thread is still running after the
    ///   timeout. The thread is not killed; `join` may be retried.
    pub fn join(&mut self) -> MonitorResult<()> {
        let Some(exited) = self.exited.as_ref() else {
            return match self.state {
                WorkerState::Terminated => Ok(()),
                _ => Err(LifecycleError::NotStarted {
                    name: self.name().to_string(),
                }
                .into()),
            };
        };

        match exited.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.thread.take() {
                    if handle.join().is_err() {
                        warn!(worker = %self.name(), "worker thread panicked outside item processing");
                    }
                }
                self.exited = None;
                self.state = WorkerState::Terminated;
                debug!(worker = %self.name(), "worker joined");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(WorkerError::JoinTimeout {
                worker: self.name().to_string(),
                timeout_ms: u64::try_from(self.config.join_timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Best-effort: ask a still running consumer to exit, never block here.
        if self.state == WorkerState::Running {
            let mut st = self.handle.shared.lock();
            if !st.shutdown_requested && self.handle.tx.try_send(Message::Shutdown).is_ok() {
                st.shutdown_requested = true;
                st.pending += 1;
            }
        }
    }
}

fn consume<P: Process>(
    name: &str,
    rx: &Receiver<Message>,
    mut process: P,
    shared: Arc<Shared>,
    _exit: Sender<()>,
) {
    let _close = CloseOnExit(Arc::clone(&shared));

    while let Ok(msg) = rx.recv() {
        match msg {
            Message::Shutdown => {
                shared.complete_one();
                break;
            }
            Message::Sample(sample) => {
                match panic::catch_unwind(AssertUnwindSafe(|| process.process(&sample))) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        info!(worker = %name, sample = %sample.id(), error = %err, "failed to process sample");
                    }
                    Err(_) => {
                        warn!(worker = %name, sample = %sample.id(), "processing panicked; worker keeps running");
                    }
                }
                shared.complete_one();
            }
        }
    }

    debug!(worker = %name, "worker loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::sample::BATTERY_VOLTAGE;

    fn sample(value: f64) -> Sample {
        Sample::builder("solar")
            .measurement(BATTERY_VOLTAGE, "Battery", value, "V")
            .build()
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Process) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let process = move |s: &Arc<Sample>| -> MonitorResult<()> {
            sink.lock().unwrap().push(s.require(BATTERY_VOLTAGE)?.value);
            Ok(())
        };
        (seen, process)
    }

    fn noop() -> impl Process {
        |_: &Arc<Sample>| -> MonitorResult<()> { Ok(()) }
    }

    fn config(capacity: usize) -> WorkerConfig {
        WorkerConfig {
            queue_capacity: capacity,
            ..WorkerConfig::default()
        }
    }

    #[test]
    fn drain_waits_for_all_items_in_fifo_order() {
        let (seen, process) = recorder();
        let mut worker = Worker::new("fifo", config(16));
        worker.start(process).unwrap();

        for i in 0..10 {
            worker.enqueue(sample(f64::from(i))).unwrap();
        }
        worker.drain().unwrap();

        let expected: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
        assert_eq!(worker.handle().pending(), 0);

        worker.stop().unwrap();
        worker.join().unwrap();
        assert_eq!(worker.state(), WorkerState::Terminated);
    }

    #[test]
    fn enqueue_rejects_shutdown_message() {
        let worker = Worker::new("sentinel", WorkerConfig::default());
        let err = worker.enqueue(Message::Shutdown).unwrap_err();
        assert!(matches!(err, MonitorError::Worker(WorkerError::InvalidArgument { .. })));
        assert_eq!(worker.handle().pending(), 0);
    }

    #[test]
    fn enqueue_reports_queue_full() {
        // Not started: nothing consumes, so the queue fills up.
        let worker = Worker::new("full", config(2));
        worker.enqueue(sample(1.0)).unwrap();
        worker.enqueue(sample(2.0)).unwrap();

        let err = worker.enqueue(sample(3.0)).unwrap_err();
        assert!(err.is_queue_full());
        assert_eq!(worker.handle().pending(), 2);
    }

    #[test]
    fn items_queued_before_start_are_processed() {
        let (seen, process) = recorder();
        let mut worker = Worker::new("prequeued", config(4));
        worker.enqueue(sample(1.0)).unwrap();

        assert!(worker.drain().unwrap_err().is_lifecycle());

        worker.start(process).unwrap();
        worker.drain().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1.0]);

        worker.stop().unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn start_twice_is_a_lifecycle_error() {
        let mut worker = Worker::new("twice", WorkerConfig::default());
        worker.start(noop()).unwrap();

        let err = worker.start(noop()).unwrap_err();
        assert_eq!(
            err,
            MonitorError::Lifecycle(LifecycleError::AlreadyStarted {
                name: "twice".to_string()
            })
        );

        worker.stop().unwrap();
        worker.join().unwrap();
        assert!(worker.start(noop()).unwrap_err().is_lifecycle());
    }

    #[test]
    fn stop_before_start_is_a_lifecycle_error() {
        let mut worker = Worker::new("early", WorkerConfig::default());
        assert!(worker.stop().unwrap_err().is_lifecycle());
        assert!(worker.join().unwrap_err().is_lifecycle());
    }

    #[test]
    fn stop_and_join_are_idempotent() {
        let mut worker = Worker::new("idempotent", WorkerConfig::default());
        worker.start(noop()).unwrap();

        worker.stop().unwrap();
        worker.stop().unwrap();
        worker.join().unwrap();
        worker.join().unwrap();
        worker.stop().unwrap();
        assert_eq!(worker.state(), WorkerState::Terminated);
    }

    #[test]
    fn enqueue_after_stop_is_rejected() {
        let mut worker = Worker::new("closed", WorkerConfig::default());
        worker.start(noop()).unwrap();
        worker.stop().unwrap();

        let err = worker.enqueue(sample(1.0)).unwrap_err();
        assert!(matches!(err, MonitorError::Worker(WorkerError::Stopped { .. })));

        worker.join().unwrap();
        worker.drain().unwrap();
    }

    #[test]
    fn stop_processes_items_queued_before_it() {
        let (seen, process) = recorder();
        let mut worker = Worker::new("graceful", config(8));
        worker.start(process).unwrap();

        for i in 0..5 {
            worker.enqueue(sample(f64::from(i))).unwrap();
        }
        worker.stop().unwrap();
        worker.join().unwrap();

        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn failing_and_panicking_items_do_not_kill_the_consumer() {
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        let mut worker = Worker::new("resilient", config(8));
        worker
            .start(move |s: &Arc<Sample>| -> MonitorResult<()> {
                let value = s.require(BATTERY_VOLTAGE)?.value;
                if value < 0.0 {
                    panic!("negative voltage");
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        worker.enqueue(Sample::builder("solar").build()).unwrap();
        worker.enqueue(sample(-1.0)).unwrap();
        worker.enqueue(sample(12.0)).unwrap();
        worker.drain().unwrap();

        assert_eq!(processed.load(Ordering::SeqCst), 1);

        worker.stop().unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn join_times_out_on_a_busy_consumer() {
        let (release_tx, release_rx) = bounded::<()>(0);
        let mut worker = Worker::new(
            "busy",
            WorkerConfig {
                join_timeout: Duration::from_millis(50),
                ..WorkerConfig::default()
            },
        );
        worker
            .start(move |_: &Arc<Sample>| -> MonitorResult<()> {
                let _ = release_rx.recv();
                Ok(())
            })
            .unwrap();

        worker.enqueue(sample(1.0)).unwrap();
        worker.stop().unwrap();

        let err = worker.join().unwrap_err();
        assert!(matches!(err, MonitorError::Worker(WorkerError::JoinTimeout { timeout_ms: 50, .. })));

        release_tx.send(()).unwrap();
        worker.join().unwrap();
        assert_eq!(worker.state(), WorkerState::Terminated);
    }

    #[test]
    fn missing_measurement_is_logged_not_fatal() {
        let mut worker = Worker::new("missing", WorkerConfig::default());
        worker
            .start(|s: &Arc<Sample>| -> MonitorResult<()> {
                s.require("Nope")?;
                Ok(())
            })
            .unwrap();
        worker.enqueue(sample(1.0)).unwrap();
        worker.drain().unwrap();
        worker.stop().unwrap();
        worker.join().unwrap();
    }
}
