use std::sync::Arc;

use immersive_protocol::ids::SourceId;
use immersive_protocol::media::{MediaElement, PlaybackOptions};

use crate::error::{LaunchError, AUTOPLAY_BLOCKED_MESSAGE};

/// Proof that the current call chain started from a user action.
///
/// Hosts refuse unmuted autoplay without one, so only the Go dispatch path in
/// this crate can mint it.
#[derive(Debug)]
pub struct UserGesture {
    _private: (),
}

impl UserGesture {
    pub(crate) fn from_go_click() -> Self {
        Self { _private: () }
    }
}

/// Owns the shared video element's source and play/pause state.
#[derive(Clone)]
pub struct PlaybackController {
    media: Arc<dyn MediaElement>,
    options: PlaybackOptions,
}

impl PlaybackController {
    pub fn new(media: Arc<dyn MediaElement>, options: PlaybackOptions) -> Self {
        Self { media, options }
    }

    pub fn media(&self) -> Arc<dyn MediaElement> {
        Arc::clone(&self.media)
    }

    /// Replaces the source unconditionally and waits until playback begins.
    pub async fn start(&self, _gesture: &UserGesture, source: &SourceId) -> Result<(), LaunchError> {
        self.media.set_source(source);
        self.media.configure(&self.options);

        let started = match self.media.load() {
            Ok(()) => self.media.play().await,
            Err(error) => Err(error),
        };
        if let Err(error) = started {
            tracing::warn!(source = %source, error = %error, "video playback was refused");
            return Err(LaunchError::PlaybackBlocked(
                AUTOPLAY_BLOCKED_MESSAGE.to_owned(),
            ));
        }

        tracing::debug!(source = %source, "video playback started");
        Ok(())
    }

    /// Pauses without rewinding.
    pub fn stop(&self) {
        if !self.media.is_paused() {
            self.media.pause();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.media.is_paused()
    }
}
