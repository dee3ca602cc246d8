use serde::{Deserialize, Serialize};

use crate::ids::ImmersiveSessionId;

pub const LOCAL_FLOOR_FEATURE: &str = "local-floor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    ImmersiveVr,
    ImmersiveAr,
    Inline,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImmersiveVr => "immersive-vr",
            Self::ImmersiveAr => "immersive-ar",
            Self::Inline => "inline",
        }
    }

    pub fn is_immersive(self) -> bool {
        !matches!(self, Self::Inline)
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub mode: SessionMode,
    pub required_features: Vec<String>,
    #[serde(default)]
    pub optional_features: Vec<String>,
}

impl Default for SessionRequest {
    fn default() -> Self {
        Self {
            mode: SessionMode::ImmersiveVr,
            required_features: vec![LOCAL_FLOOR_FEATURE.to_owned()],
            optional_features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmersiveSessionHandle {
    pub session_id: ImmersiveSessionId,
    pub mode: SessionMode,
}
