use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use immersive_protocol::{
    CameraSpec, PlaybackOptions, SceneSpec, SessionMode, SessionRequest, SourceId, SphereSpec,
    TextureFilter, TextureFormat, VideoTextureSpec, LOCAL_FLOOR_FEATURE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_IMMERSIVE_PLAYER_CONFIG: &str = "IMMERSIVE_PLAYER_CONFIG";

const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
const DEFAULT_EVENTBUS_CAPACITY: usize = 64;
const MIN_SPHERE_SEGMENTS: u32 = 3;
const DEFAULT_CROSS_ORIGIN: &str = "anonymous";
const DEFAULT_GENERAL_CATALOG: &[(&str, &str)] = &[
    ("videos/general/coral-reef.mp4", "Coral reef dive"),
    ("videos/general/alpine-ridge.mp4", "Alpine ridge walk"),
];
const DEFAULT_SPECIAL_CATALOG: &[(&str, &str)] = &[
    ("videos/special/ward-orientation.mp4", "Ward orientation"),
    ("videos/special/quiet-garden.mp4", "Quiet garden"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImmersiveConfig {
    #[serde(default)]
    pub catalogs: CatalogsConfigToml,
    #[serde(default)]
    pub session: SessionConfigToml,
    #[serde(default)]
    pub playback: PlaybackConfigToml,
    #[serde(default)]
    pub scene: SceneConfigToml,
    #[serde(default)]
    pub render: RenderConfigToml,
    #[serde(default)]
    pub eventbus: EventBusConfigToml,
}

impl ImmersiveConfig {
    pub fn session_request(&self) -> SessionRequest {
        SessionRequest {
            mode: self.session.mode,
            required_features: self.session.required_features.clone(),
            optional_features: self.session.optional_features.clone(),
        }
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            looped: self.playback.looped,
            muted: self.playback.muted,
            cross_origin: Some(self.playback.cross_origin.clone())
                .filter(|cross_origin| !cross_origin.is_empty()),
        }
    }

    pub fn scene_spec(&self) -> SceneSpec {
        let scene = &self.scene;
        SceneSpec {
            camera: CameraSpec {
                fov_degrees: scene.fov_degrees,
                near: scene.near,
                far: scene.far,
                ..CameraSpec::default()
            },
            sphere: SphereSpec {
                radius: scene.radius,
                width_segments: scene.width_segments,
                height_segments: scene.height_segments,
                inward_facing: scene.inward_facing,
            },
            texture: VideoTextureSpec {
                min_filter: scene.filter,
                mag_filter: scene.filter,
                format: scene.format,
            },
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.render.frame_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntryToml {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

impl CatalogEntryToml {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    pub fn source_id(&self) -> SourceId {
        SourceId::new(self.id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogsConfigToml {
    #[serde(default = "default_general_catalog")]
    pub general: Vec<CatalogEntryToml>,
    #[serde(default = "default_special_catalog")]
    pub special: Vec<CatalogEntryToml>,
}

impl Default for CatalogsConfigToml {
    fn default() -> Self {
        Self {
            general: default_general_catalog(),
            special: default_special_catalog(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfigToml {
    #[serde(default = "default_session_mode")]
    pub mode: SessionMode,
    #[serde(default = "default_required_features")]
    pub required_features: Vec<String>,
    #[serde(default)]
    pub optional_features: Vec<String>,
}

impl Default for SessionConfigToml {
    fn default() -> Self {
        Self {
            mode: default_session_mode(),
            required_features: default_required_features(),
            optional_features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackConfigToml {
    #[serde(default = "default_true")]
    pub looped: bool,
    #[serde(default)]
    pub muted: bool,
    /// Empty disables the cross-origin attribute.
    #[serde(default = "default_cross_origin")]
    pub cross_origin: String,
}

impl Default for PlaybackConfigToml {
    fn default() -> Self {
        Self {
            looped: true,
            muted: false,
            cross_origin: default_cross_origin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneConfigToml {
    #[serde(default = "default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default = "default_segments")]
    pub width_segments: u32,
    #[serde(default = "default_segments")]
    pub height_segments: u32,
    #[serde(default)]
    pub filter: TextureFilter,
    #[serde(default)]
    pub format: TextureFormat,
    #[serde(default = "default_true")]
    pub inward_facing: bool,
}

impl Default for SceneConfigToml {
    fn default() -> Self {
        Self {
            fov_degrees: default_fov_degrees(),
            near: default_near(),
            far: default_far(),
            radius: default_radius(),
            width_segments: default_segments(),
            height_segments: default_segments(),
            filter: TextureFilter::default(),
            format: TextureFormat::default(),
            inward_facing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderConfigToml {
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl Default for RenderConfigToml {
    fn default() -> Self {
        Self {
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventBusConfigToml {
    #[serde(default = "default_eventbus_capacity")]
    pub buffer_capacity: usize,
}

impl Default for EventBusConfigToml {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_EVENTBUS_CAPACITY,
        }
    }
}

pub fn load_from_env() -> Result<ImmersiveConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ImmersiveConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home
        .join(".config")
        .join("immersive-player")
        .join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_IMMERSIVE_PLAYER_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(raw.into())
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(_) => Err(ConfigError::configuration(
            "IMMERSIVE_PLAYER_CONFIG contained invalid UTF-8",
        )),
    }
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}

fn default_catalog(entries: &[(&str, &str)]) -> Vec<CatalogEntryToml> {
    entries
        .iter()
        .map(|(id, label)| CatalogEntryToml::new(*id, *label))
        .collect()
}

fn default_general_catalog() -> Vec<CatalogEntryToml> {
    default_catalog(DEFAULT_GENERAL_CATALOG)
}

fn default_special_catalog() -> Vec<CatalogEntryToml> {
    default_catalog(DEFAULT_SPECIAL_CATALOG)
}

fn default_session_mode() -> SessionMode {
    SessionMode::ImmersiveVr
}

fn default_required_features() -> Vec<String> {
    vec![LOCAL_FLOOR_FEATURE.to_owned()]
}

fn default_true() -> bool {
    true
}

fn default_cross_origin() -> String {
    DEFAULT_CROSS_ORIGIN.to_owned()
}

fn default_fov_degrees() -> f32 {
    CameraSpec::default().fov_degrees
}

fn default_near() -> f32 {
    CameraSpec::default().near
}

fn default_far() -> f32 {
    CameraSpec::default().far
}

fn default_radius() -> f32 {
    SphereSpec::default().radius
}

fn default_segments() -> u32 {
    SphereSpec::default().width_segments
}

fn default_frame_interval_ms() -> u64 {
    DEFAULT_FRAME_INTERVAL_MS
}

fn default_eventbus_capacity() -> usize {
    DEFAULT_EVENTBUS_CAPACITY
}

pub fn persist_config(path: &Path, config: &ImmersiveConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize IMMERSIVE_PLAYER_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write IMMERSIVE_PLAYER_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<ImmersiveConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for IMMERSIVE_PLAYER_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = ImmersiveConfig::default();
            persist_config(path, &default_config)?;
            tracing::info!(path = %path.display(), "wrote default configuration");

            toml::to_string_pretty(&default_config).map_err(|err| {
                ConfigError::configuration(format!(
                    "Failed to serialize default IMMERSIVE_PLAYER_CONFIG: {err}"
                ))
            })?
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read IMMERSIVE_PLAYER_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: ImmersiveConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse IMMERSIVE_PLAYER_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    let changed = normalize_config(&mut config);
    validate_config(&config)?;
    if changed {
        tracing::info!(path = %path.display(), "persisting normalized configuration");
        persist_config(path, &config)?;
    }

    Ok(config)
}

/// Repairs values that have an obvious in-range replacement. Returns whether
/// anything changed.
pub fn normalize_config(config: &mut ImmersiveConfig) -> bool {
    let mut changed = false;

    changed |= normalize_catalog(&mut config.catalogs.general);
    changed |= normalize_catalog(&mut config.catalogs.special);
    changed |= normalize_string_vec(&mut config.session.required_features);
    changed |= normalize_string_vec(&mut config.session.optional_features);

    let cross_origin = config.playback.cross_origin.trim();
    if cross_origin.len() != config.playback.cross_origin.len() {
        config.playback.cross_origin = cross_origin.to_owned();
        changed = true;
    }

    for segments in [
        &mut config.scene.width_segments,
        &mut config.scene.height_segments,
    ] {
        let normalized = (*segments).max(MIN_SPHERE_SEGMENTS);
        if normalized != *segments {
            *segments = normalized;
            changed = true;
        }
    }

    let normalized_frame_interval_ms = config.render.frame_interval_ms.max(1);
    if normalized_frame_interval_ms != config.render.frame_interval_ms {
        config.render.frame_interval_ms = normalized_frame_interval_ms;
        changed = true;
    }

    let normalized_capacity = config.eventbus.buffer_capacity.max(1);
    if normalized_capacity != config.eventbus.buffer_capacity {
        config.eventbus.buffer_capacity = normalized_capacity;
        changed = true;
    }

    changed
}

/// Rejects values with no sensible repair.
pub fn validate_config(config: &ImmersiveConfig) -> Result<(), ConfigError> {
    validate_catalog("general", &config.catalogs.general)?;
    validate_catalog("special", &config.catalogs.special)?;

    if !config.session.mode.is_immersive() {
        return Err(ConfigError::configuration(format!(
            "session.mode '{}' is not allowed; playback requires an immersive session",
            config.session.mode
        )));
    }
    if !config
        .session
        .required_features
        .iter()
        .any(|feature| feature == LOCAL_FLOOR_FEATURE)
    {
        return Err(ConfigError::configuration(format!(
            "session.required_features must include '{LOCAL_FLOOR_FEATURE}', got {:?}",
            config.session.required_features
        )));
    }

    let scene = &config.scene;
    if !(scene.fov_degrees > 0.0 && scene.fov_degrees < 180.0) {
        return Err(ConfigError::configuration(format!(
            "scene.fov_degrees must be between 0 and 180 exclusive, got {}",
            scene.fov_degrees
        )));
    }
    if !(scene.near > 0.0 && scene.near < scene.far) {
        return Err(ConfigError::configuration(format!(
            "scene.near must be positive and below scene.far, got near={} far={}",
            scene.near, scene.far
        )));
    }
    if !(scene.radius > 0.0 && scene.radius.is_finite()) {
        return Err(ConfigError::configuration(format!(
            "scene.radius must be a positive finite number, got {}",
            scene.radius
        )));
    }

    Ok(())
}

fn normalize_catalog(entries: &mut [CatalogEntryToml]) -> bool {
    let mut changed = false;
    for entry in entries.iter_mut() {
        let id = entry.id.trim();
        if id.len() != entry.id.len() {
            entry.id = id.to_owned();
            changed = true;
        }
        let label = entry.label.trim();
        if label.is_empty() {
            entry.label = entry.id.clone();
            changed = true;
        } else if label.len() != entry.label.len() {
            entry.label = label.to_owned();
            changed = true;
        }
    }
    changed
}

fn validate_catalog(name: &str, entries: &[CatalogEntryToml]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.id.is_empty() {
            return Err(ConfigError::configuration(format!(
                "catalogs.{name} contains an entry with an empty id"
            )));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::configuration(format!(
                "catalogs.{name} lists '{}' more than once",
                entry.id
            )));
        }
    }
    Ok(())
}

fn normalize_string_vec(values: &mut Vec<String>) -> bool {
    let mut normalized = Vec::with_capacity(values.len());
    for value in values.iter() {
        let value = value.trim();
        if !value.is_empty() && !normalized.iter().any(|existing: &String| existing == value) {
            normalized.push(value.to_owned());
        }
    }
    if normalized != *values {
        *values = normalized;
        return true;
    }
    false
}
