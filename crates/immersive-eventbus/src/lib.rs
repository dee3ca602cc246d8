//! Lifecycle event publish/fanout.

pub mod bus;
pub mod envelope;

pub use bus::{
    LifecycleEventBus, LifecycleEventBusConfig, LifecycleEventSubscription,
    DEFAULT_BUFFER_CAPACITY,
};
pub use envelope::LifecycleEventEnvelope;
