use std::sync::Arc;
use std::time::Duration;

use backend_simulated::{
    SimulatedMediaElement, SimulatedPlatform, SimulatedPlatformConfig, SimulatedRenderEngine,
};
use immersive_config::{CatalogEntryToml, ImmersiveConfig};
use immersive_eventbus::{LifecycleEventBus, LifecycleEventBusConfig};
use immersive_lifecycle::{
    Catalog, CatalogEntry, CatalogKind, LifecycleCollaborators, LifecycleSettings,
    LifecycleSnapshot, SessionLifecycleManager,
};
use immersive_protocol::{LifecycleEvent, SessionState};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::cli::CliFlags;
use crate::commands::{parse_command, PlayerCommand};
use crate::error::{AppError, AppResult};

const HEADSET_END_REASON: &str = "headset removed";
const SESSION_END_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogListing {
    pub general: Catalog,
    pub special: Catalog,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutcome {
    Snapshot { snapshot: LifecycleSnapshot },
    Catalogs { catalogs: CatalogListing },
    Quit,
}

/// The lifecycle manager wired to the simulated backends.
pub struct PlayerRuntime {
    manager: SessionLifecycleManager,
    platform: SimulatedPlatform,
}

impl PlayerRuntime {
    pub fn new(config: &ImmersiveConfig, flags: &CliFlags) -> Self {
        let mut platform_config = SimulatedPlatformConfig {
            api_available: !flags.no_xr_api,
            deny_reason: flags.deny_session.clone(),
            ..SimulatedPlatformConfig::default()
        };
        if flags.unsupported {
            platform_config.supported_modes.clear();
        }
        let platform = SimulatedPlatform::new(platform_config);

        let media = Arc::new(SimulatedMediaElement::new());
        media.set_block_autoplay(flags.block_autoplay);
        let engine = Arc::new(SimulatedRenderEngine::new());

        let settings = LifecycleSettings {
            general: catalog_from_config(CatalogKind::General, &config.catalogs.general),
            special: catalog_from_config(CatalogKind::Special, &config.catalogs.special),
            session_request: config.session_request(),
            playback: config.playback_options(),
            scene: config.scene_spec(),
            frame_interval: config.frame_interval(),
        };
        let eventbus = Arc::new(LifecycleEventBus::new(LifecycleEventBusConfig {
            buffer_capacity: config.eventbus.buffer_capacity,
        }));

        let manager = SessionLifecycleManager::new(
            LifecycleCollaborators {
                platform: Arc::new(platform.clone()),
                media,
                engine,
            },
            settings,
            eventbus,
        );
        Self { manager, platform }
    }

    pub fn manager(&self) -> &SessionLifecycleManager {
        &self.manager
    }

    pub async fn execute(&self, command: PlayerCommand) -> AppResult<CommandOutcome> {
        let snapshot = match command {
            PlayerCommand::Select { catalog, source } => {
                self.manager.select(catalog, Some(source)).await?
            }
            PlayerCommand::Clear(catalog) => self.manager.select(catalog, None).await?,
            PlayerCommand::Go => self.manager.go().await,
            PlayerCommand::End => self.end_from_headset().await?,
            PlayerCommand::Status => self.manager.snapshot().await,
            PlayerCommand::Catalogs => {
                return Ok(CommandOutcome::Catalogs {
                    catalogs: CatalogListing {
                        general: self.manager.catalog(CatalogKind::General).await,
                        special: self.manager.catalog(CatalogKind::Special).await,
                    },
                });
            }
            PlayerCommand::Quit => return Ok(CommandOutcome::Quit),
        };
        Ok(CommandOutcome::Snapshot { snapshot })
    }

    /// Ends the active session from the platform side and waits for the
    /// lifecycle to observe it.
    async fn end_from_headset(&self) -> AppResult<LifecycleSnapshot> {
        let snapshot = self.manager.snapshot().await;
        let session_id = match (snapshot.state, snapshot.active_session) {
            (SessionState::Active, Some(session_id)) => session_id,
            _ => return Err(AppError::command("no immersive session is active")),
        };

        let mut events = self.manager.subscribe();
        self.platform
            .end_from_platform(&session_id, Some(HEADSET_END_REASON.to_owned()))
            .await
            .map_err(|error| AppError::command(error.to_string()))?;

        let observed = tokio::time::timeout(SESSION_END_TIMEOUT, async {
            while let Some(envelope) = events.next_event().await {
                if let LifecycleEvent::StateChanged {
                    to: SessionState::Ended,
                    ..
                } = envelope.event
                {
                    return true;
                }
            }
            false
        })
        .await;
        if !matches!(observed, Ok(true)) {
            tracing::warn!(session_id = %session_id, "session end was not observed in time");
        }
        Ok(self.manager.snapshot().await)
    }
}

fn catalog_from_config(kind: CatalogKind, entries: &[CatalogEntryToml]) -> Catalog {
    Catalog::new(
        kind,
        entries
            .iter()
            .map(|entry| CatalogEntry::new(entry.source_id(), entry.label.clone()))
            .collect(),
    )
}

/// Reads commands line by line and writes one JSON document per command.
pub async fn run_command_loop<R, W>(runtime: &PlayerRuntime, reader: R, mut writer: W) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let outcome = match parse_command(&line) {
            Ok(Some(command)) => runtime.execute(command).await,
            Ok(None) => continue,
            Err(error) => Err(error),
        };

        let rendered = match outcome {
            Ok(CommandOutcome::Quit) => break,
            Ok(outcome) => serde_json::to_string(&outcome)?,
            Err(error) if error.is_recoverable() => {
                tracing::debug!(error = %error, "command rejected");
                serde_json::to_string(&serde_json::json!({
                    "kind": "error",
                    "message": error.to_string(),
                }))?
            }
            Err(error) => return Err(error),
        };
        writer.write_all(rendered.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
