use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformResult;
use crate::ids::SourceId;

pub const DEFAULT_CROSS_ORIGIN: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackOptions {
    pub looped: bool,
    pub muted: bool,
    pub cross_origin: Option<String>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            looped: true,
            muted: false,
            cross_origin: Some(DEFAULT_CROSS_ORIGIN.to_owned()),
        }
    }
}

/// The single shared video element the sphere texture samples from.
#[async_trait]
pub trait MediaElement: Send + Sync {
    fn set_source(&self, source: &SourceId);
    fn configure(&self, options: &PlaybackOptions);
    fn load(&self) -> PlatformResult<()>;
    /// Resolves once playback has actually begun.
    async fn play(&self) -> PlatformResult<()>;
    fn pause(&self);
    fn is_paused(&self) -> bool;
}
