use immersive_protocol::ids::{ImmersiveSessionId, SourceId};
use immersive_protocol::session::ImmersiveSessionHandle;
use immersive_protocol::state::{GoControlMode, SessionState};
use serde::{Deserialize, Serialize};

use crate::error::{LaunchError, LifecycleError, LifecycleResult};
use crate::selection::{CatalogKind, SelectionCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoControl {
    pub enabled: bool,
    pub mode: GoControlMode,
}

impl Default for GoControl {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: GoControlMode::Enter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub state: SessionState,
    pub go: GoControl,
    pub status: Option<String>,
    pub active_session: Option<ImmersiveSessionId>,
    pub selection: Option<SourceId>,
    pub selected_catalog: Option<CatalogKind>,
    pub last_failure: Option<LaunchError>,
    pub attempt: u64,
}

/// Everything the lifecycle manager treats as process-wide state.
#[derive(Debug)]
pub struct LifecycleContext {
    state: SessionState,
    go: GoControl,
    selection: SelectionCoordinator,
    active_session: Option<ImmersiveSessionHandle>,
    last_failure: Option<LaunchError>,
    attempt: u64,
}

impl LifecycleContext {
    pub fn new(selection: SelectionCoordinator) -> Self {
        Self {
            state: SessionState::Idle,
            go: GoControl::default(),
            selection,
            active_session: None,
            last_failure: None,
            attempt: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next` and returns the state it left. The state is left
    /// untouched when the move is not in the transition table.
    pub fn transition(&mut self, next: SessionState) -> LifecycleResult<SessionState> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        Ok(std::mem::replace(&mut self.state, next))
    }

    pub fn go(&self) -> GoControl {
        self.go
    }

    /// Returns the new control value when it actually changed.
    pub fn set_go(&mut self, enabled: bool, mode: GoControlMode) -> Option<GoControl> {
        let next = GoControl { enabled, mode };
        if self.go == next {
            return None;
        }
        self.go = next;
        Some(next)
    }

    pub fn selection(&self) -> &SelectionCoordinator {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionCoordinator {
        &mut self.selection
    }

    pub fn active_session(&self) -> Option<&ImmersiveSessionHandle> {
        self.active_session.as_ref()
    }

    pub fn set_active_session(&mut self, handle: ImmersiveSessionHandle) {
        self.active_session = Some(handle);
    }

    pub fn take_active_session(&mut self) -> Option<ImmersiveSessionHandle> {
        self.active_session.take()
    }

    pub fn begin_attempt(&mut self) -> u64 {
        self.attempt += 1;
        self.last_failure = None;
        self.attempt
    }

    pub fn record_failure(&mut self, error: LaunchError) {
        self.last_failure = Some(error);
    }

    pub fn snapshot(&self, status: Option<String>) -> LifecycleSnapshot {
        LifecycleSnapshot {
            state: self.state,
            go: self.go,
            status,
            active_session: self
                .active_session
                .as_ref()
                .map(|handle| handle.session_id.clone()),
            selection: self.selection.resolve().cloned(),
            selected_catalog: self.selection.resolved_catalog(),
            last_failure: self.last_failure.clone(),
            attempt: self.attempt,
        }
    }
}
