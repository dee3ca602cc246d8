use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    CheckingSupport,
    StartingVideo,
    PreparingScene,
    RequestingSession,
    Active,
    Ended,
    Failed,
}

impl SessionState {
    /// True while a launch attempt is between its first and last step.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::CheckingSupport
                | Self::StartingVideo
                | Self::PreparingScene
                | Self::RequestingSession
        )
    }

    /// States from which a new launch attempt may begin.
    pub fn accepts_launch(self) -> bool {
        matches!(self, Self::Idle | Self::Ended | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle | Self::Ended | Self::Failed, Self::CheckingSupport) => true,
            (Self::CheckingSupport, Self::StartingVideo) => true,
            (Self::StartingVideo, Self::PreparingScene) => true,
            (Self::PreparingScene, Self::RequestingSession) => true,
            (Self::RequestingSession, Self::Active) => true,
            (Self::Active, Self::Ended) => true,
            (current, Self::Failed) => current.is_in_flight(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingSupport => "checking_support",
            Self::StartingVideo => "starting_video",
            Self::PreparingScene => "preparing_scene",
            Self::RequestingSession => "requesting_session",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a click on the action control will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GoControlMode {
    #[default]
    Enter,
    EndAndRestart,
}
