use immersive_protocol::event::LifecycleEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEventEnvelope {
    pub sequence: u64,
    pub received_at_monotonic_nanos: u64,
    pub event: LifecycleEvent,
}
