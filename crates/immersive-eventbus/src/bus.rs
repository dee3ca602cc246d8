use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use immersive_protocol::event::LifecycleEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::envelope::LifecycleEventEnvelope;

pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleEventBusConfig {
    pub buffer_capacity: usize,
}

impl Default for LifecycleEventBusConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

#[derive(Debug)]
pub struct LifecycleEventBus {
    next_sequence: AtomicU64,
    boot_instant: Instant,
    sender: broadcast::Sender<LifecycleEventEnvelope>,
}

impl Default for LifecycleEventBus {
    fn default() -> Self {
        Self::new(LifecycleEventBusConfig::default())
    }
}

impl LifecycleEventBus {
    pub fn new(config: LifecycleEventBusConfig) -> Self {
        assert!(
            config.buffer_capacity > 0,
            "buffer_capacity must be greater than 0"
        );

        let (sender, _receiver) = broadcast::channel(config.buffer_capacity);
        Self {
            next_sequence: AtomicU64::new(0),
            boot_instant: Instant::now(),
            sender,
        }
    }

    pub fn subscribe(&self) -> LifecycleEventSubscription {
        LifecycleEventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: LifecycleEvent) -> LifecycleEventEnvelope {
        let envelope = LifecycleEventEnvelope {
            sequence: self.next_sequence(),
            received_at_monotonic_nanos: self.monotonic_nanos_since_bus_bootstrap(),
            event,
        };

        if self.sender.receiver_count() > 0 {
            let _ = self.sender.send(envelope.clone());
        }

        envelope
    }

    fn next_sequence(&self) -> u64 {
        let mut current = self.next_sequence.load(Ordering::Relaxed);
        loop {
            let next = current
                .checked_add(1)
                .expect("lifecycle event sequence exhausted");
            match self.next_sequence.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    fn monotonic_nanos_since_bus_bootstrap(&self) -> u64 {
        let nanos = self.boot_instant.elapsed().as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }
}

pub struct LifecycleEventSubscription {
    receiver: broadcast::Receiver<LifecycleEventEnvelope>,
}

impl LifecycleEventSubscription {
    /// Next envelope, skipping over gaps left by a lagging receiver.
    /// Returns `None` once the bus is dropped.
    pub async fn next_event(&mut self) -> Option<LifecycleEventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "lifecycle event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking drain of everything currently buffered.
    pub fn drain(&mut self) -> Vec<LifecycleEventEnvelope> {
        let mut drained = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => drained.push(envelope),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "lifecycle event subscriber lagged");
                }
                Err(_) => return drained,
            }
        }
    }
}
