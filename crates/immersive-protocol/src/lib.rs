//! Shared types and collaborator contracts for the immersive player.
//!
//! The immersive platform, the media element and the render engine are only
//! known through the traits defined here.

pub mod error;
pub mod event;
pub mod ids;
pub mod media;
pub mod platform;
pub mod render;
pub mod session;
pub mod state;

pub use error::{PlatformError, PlatformResult};
pub use event::{LifecycleEvent, SessionEndedEvent, SessionEvent, SessionVisibility};
pub use ids::{ImmersiveSessionId, RenderContextId, SourceId};
pub use media::{MediaElement, PlaybackOptions};
pub use platform::{
    GrantedSession, ImmersivePlatform, PlatformKind, SessionEventStream, SessionEventSubscription,
};
pub use render::{
    CameraSpec, RenderEngine, SceneSpec, SphereSpec, TextureFilter, TextureFormat,
    VideoTextureSpec,
};
pub use session::{ImmersiveSessionHandle, SessionMode, SessionRequest, LOCAL_FLOOR_FEATURE};
pub use state::{GoControlMode, SessionState};
