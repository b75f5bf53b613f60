//! Non-blocking progress fan-out.
//!
//! The optimization loop calls [`ProgressReporter::emit`], which only swaps
//! the event into a per-kind slot and wakes the forwarder. A background
//! task drains the slots into the (possibly slow) [`ProgressSink`]. When the
//! sink falls behind, older undelivered events of the same kind are
//! replaced by newer ones; a replaced generation snapshot promotes its
//! successor to a full refresh so the consumer never applies a delta
//! against state it did not see.

use crate::domain::optimization::run_state::{GenerationSnapshot, Heartbeat, ProgressEvent};
use crate::domain::ports::{ProgressReporter, ProgressSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Slots {
    generation: Option<GenerationSnapshot>,
    heartbeat: Option<Heartbeat>,
    closed: bool,
}

struct Shared {
    slots: Mutex<Slots>,
    notify: Notify,
    coalesced: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Slots hold plain data; a panic mid-update cannot break them
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Latest-wins reporter in front of a [`ProgressSink`]
#[derive(Clone)]
pub struct CoalescingReporter {
    shared: Arc<Shared>,
}

impl CoalescingReporter {
    /// Starts the forwarder task on the current runtime
    pub fn spawn(sink: Arc<dyn ProgressSink>) -> (Self, JoinHandle<()>) {
        let shared = Arc::new(Shared {
            slots: Mutex::new(Slots::default()),
            notify: Notify::new(),
            coalesced: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let handle = tokio::spawn(forward(Arc::clone(&shared), sink));
        (Self { shared }, handle)
    }

    /// Stops accepting events. Pending slots are still delivered before the
    /// forwarder exits.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_one();
    }

    /// Events replaced before delivery
    pub fn coalesced_count(&self) -> u64 {
        self.shared.coalesced.load(Ordering::Relaxed)
    }

    pub fn delivered_count(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.shared.failed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for CoalescingReporter {
    fn emit(&self, event: ProgressEvent) {
        let mut slots = self.shared.lock();
        if slots.closed {
            debug!("ProgressReporter: Dropping event after close");
            return;
        }

        let replaced = match event {
            ProgressEvent::Generation(mut snapshot) => {
                let replaced = slots.generation.is_some();
                if replaced {
                    snapshot.full_refresh = true;
                }
                slots.generation = Some(snapshot);
                replaced
            }
            ProgressEvent::Heartbeat(heartbeat) => slots.heartbeat.replace(heartbeat).is_some(),
        };
        drop(slots);

        if replaced {
            self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify.notify_one();
    }
}

async fn forward(shared: Arc<Shared>, sink: Arc<dyn ProgressSink>) {
    loop {
        let (generation, heartbeat, closed) = {
            let mut slots = shared.lock();
            (slots.generation.take(), slots.heartbeat.take(), slots.closed)
        };

        if generation.is_none() && heartbeat.is_none() {
            if closed {
                break;
            }
            shared.notify.notified().await;
            continue;
        }

        let events = generation
            .map(ProgressEvent::Generation)
            .into_iter()
            .chain(heartbeat.map(ProgressEvent::Heartbeat));

        for event in events {
            match sink.deliver(event).await {
                Ok(()) => {
                    shared.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("ProgressReporter: Sink delivery failed: {}", e);
                }
            }
        }
    }

    info!(
        "ProgressReporter: Forwarder stopped (delivered={}, coalesced={}, failed={})",
        shared.delivered.load(Ordering::Relaxed),
        shared.coalesced.load(Ordering::Relaxed),
        shared.failed.load(Ordering::Relaxed)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::SinkDeliveryError;
    use crate::domain::optimization::run_state::{GenerationSummary, RunState};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::{Duration, Instant};
    use tokio::sync::Mutex as AsyncMutex;

    struct SlowSink {
        delay: Duration,
        fail: bool,
        received: AsyncMutex<Vec<ProgressEvent>>,
    }

    impl SlowSink {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                delay,
                fail,
                received: AsyncMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProgressSink for SlowSink {
        async fn deliver(&self, event: ProgressEvent) -> Result<(), SinkDeliveryError> {
            tokio::time::sleep(self.delay).await;
            self.received.lock().await.push(event);
            if self.fail {
                return Err(SinkDeliveryError::Unavailable {
                    reason: "dashboard offline".to_string(),
                });
            }
            Ok(())
        }
    }

    fn snapshot(generation: u64) -> ProgressEvent {
        ProgressEvent::Generation(GenerationSnapshot {
            run_id: "run".to_string(),
            generation,
            number_of_iterations: 20,
            summary: GenerationSummary {
                generation,
                objectives: vec![],
                evaluated: 0,
                evaluation_failures: 0,
                front_zero_size: 0,
                elite_size: 0,
                duration_ms: 0,
            },
            elite: vec![],
            elite_added: vec![],
            elite_removed: vec![],
            full_refresh: false,
            timestamp: Utc::now(),
        })
    }

    fn heartbeat(generation: u64) -> ProgressEvent {
        ProgressEvent::Heartbeat(Heartbeat {
            run_id: "run".to_string(),
            state: RunState::Running,
            generation,
            uptime_seconds: generation,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_emit_does_not_wait_for_slow_sink() {
        let sink = SlowSink::new(Duration::from_millis(200), false);
        let (reporter, handle) = CoalescingReporter::spawn(sink.clone());

        let started = Instant::now();
        for generation in 1..=20 {
            reporter.emit(snapshot(generation));
        }
        assert!(started.elapsed() < Duration::from_millis(100));

        reporter.close();
        handle.await.unwrap();

        let received = sink.received.lock().await;
        assert!(received.len() < 20);
        assert!(reporter.coalesced_count() > 0);
        match received.last() {
            Some(ProgressEvent::Generation(last)) => {
                assert_eq!(last.generation, 20);
                assert!(last.full_refresh);
            }
            other => panic!("unexpected last event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_heartbeats_coalesce_independently() {
        let sink = SlowSink::new(Duration::from_millis(50), false);
        let (reporter, handle) = CoalescingReporter::spawn(sink.clone());

        reporter.emit(snapshot(3));
        for i in 0..5 {
            reporter.emit(heartbeat(i));
        }
        reporter.close();
        handle.await.unwrap();

        let received = sink.received.lock().await;
        assert!(received.iter().any(|e| !e.is_heartbeat()));
        let last_heartbeat = received.iter().rev().find(|e| e.is_heartbeat());
        assert!(matches!(
            last_heartbeat,
            Some(ProgressEvent::Heartbeat(h)) if h.generation == 4
        ));
    }

    #[tokio::test]
    async fn test_sink_failures_do_not_stop_forwarding() {
        let sink = SlowSink::new(Duration::from_millis(1), true);
        let (reporter, handle) = CoalescingReporter::spawn(sink.clone());

        reporter.emit(snapshot(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        reporter.emit(snapshot(2));
        reporter.close();
        handle.await.unwrap();

        assert_eq!(sink.received.lock().await.len(), 2);
        assert_eq!(reporter.failed_count(), 2);
        assert_eq!(reporter.delivered_count(), 0);
    }

    #[tokio::test]
    async fn test_events_after_close_are_dropped() {
        let sink = SlowSink::new(Duration::from_millis(1), false);
        let (reporter, handle) = CoalescingReporter::spawn(sink.clone());

        reporter.close();
        reporter.emit(snapshot(1));
        handle.await.unwrap();

        assert!(sink.received.lock().await.is_empty());
    }
}
