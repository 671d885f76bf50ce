//! One polling tick: read the controller, log, publish.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{info, warn};

use crate::driver::StatusDriver;
use crate::error::MonitorResult;
use crate::event::{Coordinator, PublishSummary};
use crate::sample::{Sample, DEFAULT_SOURCE};

/// Turns driver readings into published samples.
///
/// The most recent sample is kept in a mutex-guarded buffer so status readers
/// on other threads can inspect it without touching the dispatch path.
pub struct Poller {
    driver: Box<dyn StatusDriver>,
    source: String,
    all: bool,
    latest: Arc<Mutex<Option<Arc<Sample>>>>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("source", &self.source)
            .field("all", &self.all)
            .finish_non_exhaustive()
    }
}

impl Poller {
    pub fn new(driver: impl StatusDriver + 'static, all: bool) -> Self {
        Self {
            driver: Box::new(driver),
            source: DEFAULT_SOURCE.to_string(),
            all,
            latest: Arc::new(Mutex::new(None)),
        }
    }

    /// Overrides the source tag of produced samples.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Shared handle to the latest-sample buffer.
    #[must_use]
    pub fn latest_handle(&self) -> Arc<Mutex<Option<Arc<Sample>>>> {
        Arc::clone(&self.latest)
    }

    /// Most recent successfully polled sample.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Sample>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Reads the driver once and records the sample as the latest one.
    ///
    /// # Errors
    ///
    /// Returns the driver failure.
    pub fn poll(&mut self) -> MonitorResult<Arc<Sample>> {
        let at = Utc::now();
        let measurements = self.driver.get_status(self.all)?;
        let sample = Arc::new(Sample::new(self.source.clone(), at, measurements));

        for (name, m) in sample.sorted() {
            info!(
                at = %at,
                group = %m.group,
                measurement = %name,
                value = m.value,
                unit = %m.unit,
                "status"
            );
        }

        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&sample));
        Ok(sample)
    }

    /// Polls and publishes one sample.
    ///
    /// A failed poll is logged and skipped; it returns `Ok(None)` so the
    /// schedule carries on with the next tick.
    ///
    /// # Errors
    ///
    /// Returns the coordinator's lifecycle error if it is not running.
    pub fn tick(&mut self, coordinator: &Coordinator) -> MonitorResult<Option<PublishSummary>> {
        let sample = match self.poll() {
            Ok(sample) => sample,
            Err(err) => {
                warn!(error = %err, "status poll failed; skipping tick");
                return Ok(None);
            }
        };
        coordinator.publish(sample).map(Some)
    }
}
