use serde::{Deserialize, Serialize};

use crate::state::{GoControlMode, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionVisibility {
    Visible,
    VisibleBlurred,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionEndedEvent {
    pub reason: Option<String>,
}

/// Notifications emitted by a granted immersive session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    VisibilityChanged(SessionVisibility),
    Ended(SessionEndedEvent),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended(_))
    }
}

/// Observable changes published by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    StatusChanged {
        message: Option<String>,
    },
    GoControlChanged {
        enabled: bool,
        mode: GoControlMode,
    },
    RenderLoopFaulted {
        reason: String,
    },
}
