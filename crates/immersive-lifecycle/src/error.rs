use immersive_protocol::ids::SourceId;
use immersive_protocol::state::SessionState;
use immersive_protocol::PlatformError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::selection::CatalogKind;

pub const NO_SELECTION_MESSAGE: &str = "Please select one simulation.";
pub const XR_API_MISSING_MESSAGE: &str =
    "WebXR not supported. Use WebXR Viewer (iOS), Android Chrome, or Quest Browser.";
pub const VR_UNSUPPORTED_MESSAGE: &str = "Immersive VR not supported on this device.";
pub const AUTOPLAY_BLOCKED_MESSAGE: &str =
    "Unable to autoplay 360° video with audio. Browser restricted it.";
pub const SESSION_REQUEST_FALLBACK_MESSAGE: &str = "Unable to start the VR session.";

/// Why a launch attempt stopped. `Display` is the user-facing status text.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchError {
    #[error("{}", NO_SELECTION_MESSAGE)]
    NoSelection,
    #[error("{0}")]
    UnsupportedPlatform(String),
    #[error("{0}")]
    PlaybackBlocked(String),
    #[error("{0}")]
    ScenePreparationFailed(String),
    #[error("{0}")]
    SessionRequestFailed(String),
}

impl LaunchError {
    pub fn probe_errored(error: &PlatformError) -> Self {
        Self::UnsupportedPlatform(format!(
            "Unable to check immersive VR support: {}",
            error.message()
        ))
    }

    pub fn session_denied(error: &PlatformError) -> Self {
        let message = error.message().trim();
        if message.is_empty() {
            Self::SessionRequestFailed(SESSION_REQUEST_FALLBACK_MESSAGE.to_owned())
        } else {
            Self::SessionRequestFailed(message.to_owned())
        }
    }

    pub fn scene_failed(error: &PlatformError) -> Self {
        Self::ScenePreparationFailed(format!("Unable to prepare the VR scene: {}", error.message()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoSelection => "no_selection",
            Self::UnsupportedPlatform(_) => "unsupported_platform",
            Self::PlaybackBlocked(_) => "playback_blocked",
            Self::ScenePreparationFailed(_) => "scene_preparation_failed",
            Self::SessionRequestFailed(_) => "session_request_failed",
        }
    }

    pub fn status_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("source {source_id} is not listed in the {catalog} catalog")]
    UnknownSource {
        catalog: CatalogKind,
        source_id: SourceId,
    },
}

pub type SelectionResult<T> = Result<T, SelectionError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("illegal session transition {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
