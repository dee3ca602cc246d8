use std::sync::{Arc, Mutex};

use immersive_eventbus::LifecycleEventBus;
use immersive_protocol::event::LifecycleEvent;

pub const CHECKING_SUPPORT_MESSAGE: &str = "Checking VR support...";
pub const STARTING_VIDEO_MESSAGE: &str = "Starting video...";
pub const ENTERING_VR_MESSAGE: &str = "Entering VR...";
pub const SESSION_ENDED_MESSAGE: &str = "VR session ended. Select another simulation.";

/// Single-slot, last-write-wins status line shown to the user.
#[derive(Debug)]
pub struct StatusReporter {
    current: Mutex<Option<String>>,
    eventbus: Arc<LifecycleEventBus>,
}

impl StatusReporter {
    pub fn new(eventbus: Arc<LifecycleEventBus>) -> Self {
        Self {
            current: Mutex::new(None),
            eventbus,
        }
    }

    pub fn set(&self, message: impl Into<String>) {
        let message = message.into();
        if message.is_empty() {
            self.clear();
            return;
        }
        tracing::info!(status = %message, "status updated");
        self.replace(Some(message));
    }

    pub fn clear(&self) {
        self.replace(None);
    }

    pub fn current(&self) -> Option<String> {
        self.current
            .lock()
            .expect("status reporter lock poisoned")
            .clone()
    }

    fn replace(&self, message: Option<String>) {
        {
            let mut current = self.current.lock().expect("status reporter lock poisoned");
            if *current == message {
                return;
            }
            current.clone_from(&message);
        }
        self.eventbus
            .publish(LifecycleEvent::StatusChanged { message });
    }
}
