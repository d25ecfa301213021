//! Buffering of regular samples between bulk uploads
//!
//! The [`SampleBuffer`] collects regular heart-rate samples; the
//! [`FlushTimer`] drives a periodic callback that snapshots the buffer and
//! submits it as one bulk request.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::types::HeartRateSample;

/// Ordered buffer of regular samples awaiting the next flush.
///
/// No deduplication and no cap: every sample added between two flushes is
/// part of the next bulk request.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Vec<HeartRateSample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: HeartRateSample) {
        self.samples.push(sample);
    }

    /// Snapshot and clear in one step
    pub fn take(&mut self) -> Vec<HeartRateSample> {
        std::mem::take(&mut self.samples)
    }

    /// Drop everything, returning how many samples were discarded
    pub fn clear(&mut self) -> usize {
        let count = self.samples.len();
        self.samples.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[HeartRateSample] {
        &self.samples
    }
}

/// Where the batcher is in its flush cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nothing buffered and nothing in flight
    Idle,
    /// Samples are buffered, waiting for the next tick
    Accumulating,
    /// A bulk submission is in flight
    Flushing,
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchState::Idle => write!(f, "idle"),
            BatchState::Accumulating => write!(f, "accumulating"),
            BatchState::Flushing => write!(f, "flushing"),
        }
    }
}

/// Recurring timer running a callback on a tokio task.
///
/// The first tick fires one full period after [`start`](Self::start), never
/// immediately. Dropping the timer stops it.
#[derive(Debug, Default)]
pub struct FlushTimer {
    handle: Option<JoinHandle<()>>,
}

impl FlushTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `period`.
    ///
    /// Does nothing if the timer is already running. Must be called from
    /// within a tokio runtime.
    pub fn start<F>(&mut self, period: Duration, mut on_tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        if self.is_running() {
            tracing::debug!("Flush timer already running");
            return;
        }

        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick();
            }
        }));
        tracing::debug!(period_secs = period.as_secs_f64(), "Flush timer started");
    }

    /// Stop ticking. A tick already running is not interrupted.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("Flush timer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
