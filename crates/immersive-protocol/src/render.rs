use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlatformResult;
use crate::ids::RenderContextId;
use crate::media::MediaElement;
use crate::session::ImmersiveSessionHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self {
            fov_degrees: 70.0,
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereSpec {
    pub radius: f32,
    pub width_segments: u32,
    pub height_segments: u32,
    /// Mirror the geometry on x so faces point at a viewer inside the sphere.
    pub inward_facing: bool,
}

impl Default for SphereSpec {
    fn default() -> Self {
        Self {
            radius: 10.0,
            width_segments: 64,
            height_segments: 64,
            inward_facing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    #[default]
    Rgb,
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoTextureSpec {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub format: TextureFormat,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneSpec {
    pub camera: CameraSpec,
    pub sphere: SphereSpec,
    pub texture: VideoTextureSpec,
}

pub trait RenderEngine: Send + Sync {
    /// Builds camera and video-textured sphere; `video` feeds the texture.
    fn create_context(
        &self,
        spec: &SceneSpec,
        video: Arc<dyn MediaElement>,
    ) -> PlatformResult<RenderContextId>;

    fn render_frame(&self, context: &RenderContextId) -> PlatformResult<()>;

    fn bind_session(
        &self,
        context: &RenderContextId,
        session: &ImmersiveSessionHandle,
    ) -> PlatformResult<()>;
}
