//! The relay pipeline
//!
//! One [`RelayPipeline`] owns everything between the wearable and the
//! backend for a single device:
//!
//! - a [`FrameReassembler`] turning notification bytes into frames
//! - a [`SampleBuffer`] of regular samples, flushed in bulk by a [`FlushTimer`]
//! - the [`Gateway`] alerts and bulk uploads are submitted to
//! - a broadcast channel of [`RelayEvent`]s for observers
//!
//! Submissions are spawned and never awaited by the pipeline itself; use
//! [`RelayPipeline::settle`] to wait for them at shutdown.
//!
//! Every method that may submit (`feed`, `flush_tick`, `on_connected`,
//! `on_disconnected`, `run`) must be called from within a tokio runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::config::RelayConfig;
use crate::dispatch::{BatchState, FlushTimer, Gateway, SampleBuffer};
use crate::error::Result;
use crate::ingest::{classify, FrameReassembler, Outcome};
use crate::transport::{Transport, TransportEvent};
use crate::types::{AlertEvent, Endpoint, RelayEvent, RelayEventKind, RelayStats};

/// Observer events held for slow subscribers before they start lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Byte-level and buffered state, guarded by one lock
#[derive(Default)]
struct IngestState {
    reassembler: FrameReassembler,
    samples: SampleBuffer,
    peripheral: Option<String>,
}

struct Inner {
    gateway: Arc<dyn Gateway>,
    flush_interval: Duration,
    flush_on_disconnect: bool,
    state: Mutex<IngestState>,
    stats: Mutex<RelayStats>,
    events: broadcast::Sender<RelayEvent>,
    in_flight: Mutex<JoinSet<()>>,
    bulk_in_flight: AtomicUsize,
    timer: Mutex<FlushTimer>,
}

/// Relay from one wearable to the backend
pub struct RelayPipeline {
    inner: Arc<Inner>,
}

impl RelayPipeline {
    pub fn new(gateway: Arc<dyn Gateway>, config: &RelayConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                gateway,
                flush_interval: config.flush_interval(),
                flush_on_disconnect: config.flush_on_disconnect,
                state: Mutex::new(IngestState::default()),
                stats: Mutex::new(RelayStats::default()),
                events,
                in_flight: Mutex::new(JoinSet::new()),
                bulk_in_flight: AtomicUsize::new(0),
                timer: Mutex::new(FlushTimer::new()),
            }),
        }
    }

    /// Receive observer events from now on. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.inner.events.subscribe()
    }

    /// A device connected: start from empty buffers and arm the flush timer.
    pub fn on_connected(&self, peripheral: &str) {
        {
            let mut state = lock(&self.inner.state);
            state.reassembler.clear();
            state.samples.clear();
            state.peripheral = Some(peripheral.to_string());
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        lock(&self.inner.timer).start(self.inner.flush_interval, move || {
            if let Some(inner) = weak.upgrade() {
                inner.flush_tick();
            }
        });

        tracing::info!(peripheral = %peripheral, "Device connected");
        self.inner
            .emit(RelayEventKind::ConnectionStatus { connected: true });
    }

    /// The link dropped: halt the timer and reset both buffers.
    ///
    /// Pending samples are discarded unless `flush_on_disconnect` is set,
    /// in which case they are submitted first.
    pub fn on_disconnected(&self, reason: &str) {
        if self.inner.flush_on_disconnect {
            self.inner.flush_tick();
        }

        lock(&self.inner.timer).stop();

        let (discarded, peripheral) = {
            let mut state = lock(&self.inner.state);
            state.reassembler.clear();
            (state.samples.clear(), state.peripheral.take())
        };
        lock(&self.inner.stats).samples_discarded += discarded as u64;

        tracing::warn!(
            peripheral = peripheral.as_deref().unwrap_or("unknown"),
            reason = %reason,
            discarded,
            "Device disconnected"
        );
        self.inner
            .emit(RelayEventKind::ConnectionStatus { connected: false });
    }

    /// Process one notification payload.
    ///
    /// Regular samples are buffered, alerts are submitted right away.
    /// Returns the classification of every frame the chunk completed.
    pub fn feed(&self, chunk: &[u8]) -> Vec<Outcome> {
        let (outcomes, malformed) = {
            let mut state = lock(&self.inner.state);
            let fed = state.reassembler.feed(chunk);
            let outcomes: Vec<Outcome> = fed.frames.iter().map(classify).collect();
            for outcome in &outcomes {
                if let Outcome::RegularSample(sample) = outcome {
                    state.samples.add(sample.clone());
                }
            }
            (outcomes, fed.malformed)
        };

        {
            let mut stats = lock(&self.inner.stats);
            stats.frames_parsed += outcomes.len() as u64;
            stats.frames_malformed += malformed as u64;
        }

        for outcome in &outcomes {
            match outcome {
                Outcome::RegularSample(sample) => {
                    lock(&self.inner.stats).samples_buffered += 1;
                    tracing::trace!(bpm = sample.measurement, "Sample buffered");
                    self.inner
                        .emit(RelayEventKind::HeartRate(sample.clone()));
                }
                Outcome::HighHeartRateAlert(alert) | Outcome::FallAlert(alert) => {
                    self.inner.forward_alert(alert);
                }
                Outcome::Invalid(reason) => {
                    lock(&self.inner.stats).frames_invalid += 1;
                    tracing::warn!(reason, "Dropped invalid frame");
                }
            }
        }

        outcomes
    }

    /// Submit everything buffered as one bulk request.
    ///
    /// Returns the number of samples submitted; an empty buffer submits
    /// nothing. The buffer is empty on return whatever the outcome.
    pub fn flush_tick(&self) -> usize {
        self.inner.flush_tick()
    }

    /// Wait for every submission started so far to finish
    pub async fn settle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.inner.in_flight));
            if tasks.is_empty() {
                break;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Submission task failed");
                }
            }
        }
    }

    /// Drive the pipeline from `transport` until it ends or fails.
    ///
    /// A transport error is treated as a disconnect and then returned, so
    /// the caller decides whether and when to try again. Observers get a
    /// `ConnectionStatus { connected: false }` event even when the error
    /// came from a connection attempt that never succeeded.
    pub async fn run<T>(&self, transport: &mut T) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        loop {
            match transport.next_event().await {
                Ok(Some(TransportEvent::Connected { peripheral })) => {
                    self.on_connected(&peripheral);
                }
                Ok(Some(TransportEvent::Notification(bytes))) => {
                    self.feed(&bytes);
                }
                Ok(Some(TransportEvent::Disconnected { reason })) => {
                    self.on_disconnected(&reason);
                }
                Ok(None) => {
                    if self.is_connected() {
                        self.on_disconnected("transport closed");
                    }
                    return Ok(());
                }
                Err(e) => {
                    if self.is_connected() {
                        self.on_disconnected(&e.to_string());
                    } else {
                        // Never connected: observers still see the failed attempt
                        tracing::warn!(error = %e, "Connection attempt failed");
                        self.inner
                            .emit(RelayEventKind::ConnectionStatus { connected: false });
                    }
                    return Err(e);
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.state).peripheral.is_some()
    }

    pub fn pending_samples(&self) -> usize {
        lock(&self.inner.state).samples.len()
    }

    /// Bytes of an incomplete frame held by the reassembler
    pub fn pending_bytes(&self) -> usize {
        lock(&self.inner.state).reassembler.pending_len()
    }

    pub fn batch_state(&self) -> BatchState {
        if self.inner.bulk_in_flight.load(Ordering::SeqCst) > 0 {
            BatchState::Flushing
        } else if self.pending_samples() > 0 {
            BatchState::Accumulating
        } else {
            BatchState::Idle
        }
    }

    pub fn is_timer_running(&self) -> bool {
        lock(&self.inner.timer).is_running()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> RelayStats {
        lock(&self.inner.stats).clone()
    }
}

impl Inner {
    fn emit(&self, kind: RelayEventKind) {
        // No subscribers is fine
        let _ = self.events.send(RelayEvent::now(kind));
    }

    fn flush_tick(self: &Arc<Self>) -> usize {
        let batch = lock(&self.state).samples.take();
        if batch.is_empty() {
            tracing::trace!("Nothing to flush");
            return 0;
        }

        let count = batch.len();
        {
            let mut stats = lock(&self.stats);
            stats.bulk_flushes += 1;
            stats.samples_flushed += count as u64;
        }
        tracing::debug!(samples = count, "Flushing samples");

        self.bulk_in_flight.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(self);
        self.spawn(async move {
            match inner.gateway.send_bulk(batch).await {
                Ok(_) => tracing::debug!(samples = count, "Bulk upload accepted"),
                Err(e) => {
                    lock(&inner.stats).delivery_failures += 1;
                    tracing::warn!(samples = count, error = %e, "Bulk upload failed, batch dropped");
                }
            }
            inner.bulk_in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        count
    }

    fn forward_alert(self: &Arc<Self>, alert: &AlertEvent) {
        let endpoint = alert.endpoint();
        let payload = alert.to_payload();

        lock(&self.stats).alerts_forwarded += 1;
        tracing::info!(endpoint = %endpoint, "Forwarding alert");
        self.emit(RelayEventKind::Alert(alert.clone()));

        let inner = Arc::clone(self);
        self.spawn(async move {
            if let Err(e) = inner.gateway.send_single(endpoint, payload).await {
                inner.delivery_failed(endpoint, e.diagnostic());
            }
        });
    }

    fn delivery_failed(&self, endpoint: Endpoint, error: String) {
        lock(&self.stats).delivery_failures += 1;
        tracing::warn!(endpoint = %endpoint, error = %error, "Alert delivery failed");
        self.emit(RelayEventKind::DeliveryFailed { endpoint, error });
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = lock(&self.in_flight);
        // Reap finished submissions so the set stays bounded
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HeartRateSample;
    use async_trait::async_trait;

    /// Gateway that accepts everything and records nothing
    struct AcceptAll;

    #[async_trait]
    impl Gateway for AcceptAll {
        async fn send_single(&self, _: Endpoint, _: serde_json::Value) -> Result<String> {
            Ok(String::new())
        }

        async fn send_bulk(&self, _: Vec<HeartRateSample>) -> Result<String> {
            Ok(String::new())
        }
    }

    fn pipeline() -> RelayPipeline {
        RelayPipeline::new(Arc::new(AcceptAll), &RelayConfig::default())
    }

    #[tokio::test]
    async fn test_batch_state_transitions() {
        let relay = pipeline();
        assert_eq!(relay.batch_state(), BatchState::Idle);

        relay.feed(br#"{"bpm":72,"timestamp":"t"}"#);
        assert_eq!(relay.batch_state(), BatchState::Accumulating);

        assert_eq!(relay.flush_tick(), 1);
        relay.settle().await;
        assert_eq!(relay.batch_state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn test_stats_count_each_outcome() {
        let relay = pipeline();
        relay.feed(br#"{"bpm":72,"timestamp":"t"}{oops}{"event":"Jump"}"#);
        relay.feed(br#"{"event":"Fall Detected","fallTime":"12:00"}"#);
        relay.settle().await;

        let stats = relay.stats();
        assert_eq!(stats.frames_parsed, 3);
        assert_eq!(stats.frames_malformed, 1);
        assert_eq!(stats.frames_invalid, 1);
        assert_eq!(stats.samples_buffered, 1);
        assert_eq!(stats.alerts_forwarded, 1);
        assert_eq!(stats.delivery_failures, 0);
    }

    #[tokio::test]
    async fn test_connect_tracks_peripheral() {
        let relay = pipeline();
        assert!(!relay.is_connected());
        relay.on_connected("band-01");
        assert!(relay.is_connected());
        assert!(relay.is_timer_running());
        relay.on_disconnected("test");
        assert!(!relay.is_connected());
        assert!(!relay.is_timer_running());
    }
}
