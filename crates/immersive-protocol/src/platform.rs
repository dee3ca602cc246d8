use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformResult;
use crate::event::SessionEvent;
use crate::session::{ImmersiveSessionHandle, SessionMode, SessionRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformKind {
    WebXr,
    OpenXr,
    Simulated,
    Other(String),
}

#[async_trait]
pub trait SessionEventSubscription: Send {
    async fn next_event(&mut self) -> PlatformResult<Option<SessionEvent>>;
}

pub type SessionEventStream = Box<dyn SessionEventSubscription>;

/// A session granted by the platform together with its notification stream.
pub struct GrantedSession {
    pub handle: ImmersiveSessionHandle,
    pub events: SessionEventStream,
}

impl std::fmt::Debug for GrantedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantedSession")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ImmersivePlatform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Whether the immersive API exists at all on this host.
    fn is_api_available(&self) -> bool {
        true
    }

    async fn is_session_supported(&self, mode: SessionMode) -> PlatformResult<bool>;

    async fn request_session(&self, request: SessionRequest) -> PlatformResult<GrantedSession>;

    async fn end_session(&self, session: &ImmersiveSessionHandle) -> PlatformResult<()>;
}
