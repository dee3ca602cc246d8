//! Launch and teardown lifecycle for the immersive 360° video player.
//!
//! [`SessionLifecycleManager`] owns the one piece of process-wide state: the
//! current [`immersive_protocol::SessionState`], the Go control and the
//! mutually exclusive catalog selection.

pub mod context;
pub mod controller;
pub mod error;
pub mod playback;
pub mod scene;
pub mod selection;
pub mod status;

pub use context::{GoControl, LifecycleContext, LifecycleSnapshot};
pub use controller::{
    LifecycleCollaborators, LifecycleInput, LifecyclePerfSnapshot, LifecycleSettings,
    SessionLifecycleManager,
};
pub use error::{LaunchError, LifecycleError, LifecycleResult, SelectionError, SelectionResult};
pub use playback::{PlaybackController, UserGesture};
pub use scene::{SceneBootstrapper, SceneContext, DEFAULT_FRAME_INTERVAL};
pub use selection::{Catalog, CatalogEntry, CatalogKind, SelectionChange, SelectionCoordinator};
pub use status::StatusReporter;
