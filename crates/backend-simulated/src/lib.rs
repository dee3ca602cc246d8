//! In-process stand-ins for the immersive platform, the video element and the
//! render engine. Every failure point the lifecycle cares about can be
//! scripted, which makes this backend the harness for headless runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use immersive_protocol::{
    GrantedSession, ImmersivePlatform, ImmersiveSessionHandle, ImmersiveSessionId, MediaElement,
    PlatformError, PlatformKind, PlatformResult, PlaybackOptions, RenderContextId, RenderEngine,
    SceneSpec, SessionEndedEvent, SessionEvent, SessionEventStream, SessionEventSubscription,
    SessionMode, SessionRequest, SessionVisibility, SourceId,
};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

const DEFAULT_EVENT_BUFFER: usize = 32;
const AUTOPLAY_REJECTION: &str =
    "NotAllowedError: play() failed because the user didn't interact with the document first.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPlatformConfig {
    /// `false` models a host without the immersive API at all.
    pub api_available: bool,
    pub supported_modes: Vec<SessionMode>,
    pub probe_error: Option<String>,
    /// When set, every session request is refused with this message.
    pub deny_reason: Option<String>,
    pub event_buffer: usize,
}

impl Default for SimulatedPlatformConfig {
    fn default() -> Self {
        Self {
            api_available: true,
            supported_modes: vec![SessionMode::ImmersiveVr, SessionMode::ImmersiveAr],
            probe_error: None,
            deny_reason: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug)]
struct SimulatedSession {
    handle: ImmersiveSessionHandle,
    event_tx: broadcast::Sender<SessionEvent>,
    terminal_event_sent: AtomicBool,
}

impl SimulatedSession {
    fn emit_non_terminal_event(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_terminal_event(&self, event: SessionEvent) -> bool {
        if self.terminal_event_sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.event_tx.send(event);
        true
    }
}

#[derive(Clone)]
pub struct SimulatedPlatform {
    config: Arc<Mutex<SimulatedPlatformConfig>>,
    sessions: Arc<AsyncMutex<HashMap<ImmersiveSessionId, Arc<SimulatedSession>>>>,
    requests: Arc<Mutex<Vec<SessionRequest>>>,
    next_session: Arc<AtomicU64>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new(SimulatedPlatformConfig::default())
    }
}

impl SimulatedPlatform {
    pub fn new(config: SimulatedPlatformConfig) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            sessions: Arc::new(AsyncMutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            next_session: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> SimulatedPlatformConfig {
        self.config
            .lock()
            .expect("simulated platform config lock poisoned")
            .clone()
    }

    pub fn update_config(&self, update: impl FnOnce(&mut SimulatedPlatformConfig)) {
        let mut config = self
            .config
            .lock()
            .expect("simulated platform config lock poisoned");
        update(&mut config);
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests
            .lock()
            .expect("simulated platform request log poisoned")
            .clone()
    }

    pub async fn active_sessions(&self) -> Vec<ImmersiveSessionId> {
        let sessions = self.sessions.lock().await;
        let mut ids = sessions.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub async fn emit_visibility(
        &self,
        session_id: &ImmersiveSessionId,
        visibility: SessionVisibility,
    ) -> PlatformResult<()> {
        let session = self.session(session_id).await?;
        session.emit_non_terminal_event(SessionEvent::VisibilityChanged(visibility));
        Ok(())
    }

    /// Ends a session from the platform side, as a headset removal or system
    /// UI exit would.
    pub async fn end_from_platform(
        &self,
        session_id: &ImmersiveSessionId,
        reason: Option<String>,
    ) -> PlatformResult<()> {
        let session = self.remove_session(session_id).await?;
        if session.emit_terminal_event(SessionEvent::Ended(SessionEndedEvent { reason })) {
            tracing::debug!(session_id = %session_id, "simulated platform ended session");
        }
        Ok(())
    }

    async fn session(
        &self,
        session_id: &ImmersiveSessionId,
    ) -> PlatformResult<Arc<SimulatedSession>> {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).cloned().ok_or_else(|| {
            PlatformError::Unavailable(format!("unknown immersive session: {session_id}"))
        })
    }

    async fn remove_session(
        &self,
        session_id: &ImmersiveSessionId,
    ) -> PlatformResult<Arc<SimulatedSession>> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(session_id).ok_or_else(|| {
            PlatformError::Unavailable(format!("unknown immersive session: {session_id}"))
        })
    }
}

#[async_trait]
impl ImmersivePlatform for SimulatedPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Simulated
    }

    fn is_api_available(&self) -> bool {
        self.config().api_available
    }

    async fn is_session_supported(&self, mode: SessionMode) -> PlatformResult<bool> {
        let config = self.config();
        if !config.api_available {
            return Err(PlatformError::Unavailable(
                "immersive API is not exposed by this host".to_owned(),
            ));
        }
        if let Some(error) = config.probe_error {
            return Err(PlatformError::Internal(error));
        }
        Ok(config.supported_modes.contains(&mode))
    }

    async fn request_session(&self, request: SessionRequest) -> PlatformResult<GrantedSession> {
        self.requests
            .lock()
            .expect("simulated platform request log poisoned")
            .push(request.clone());

        let config = self.config();
        if let Some(reason) = config.deny_reason {
            return Err(PlatformError::Rejected(reason));
        }
        if !config.supported_modes.contains(&request.mode) {
            return Err(PlatformError::Rejected(format!(
                "The requested session mode '{}' is not supported.",
                request.mode
            )));
        }

        let sequence = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = ImmersiveSessionHandle {
            session_id: ImmersiveSessionId::new(format!("xr-session-{sequence}")),
            mode: request.mode,
        };
        let (event_tx, output) = broadcast::channel(config.event_buffer.max(1));
        let session = Arc::new(SimulatedSession {
            handle: handle.clone(),
            event_tx,
            terminal_event_sent: AtomicBool::new(false),
        });

        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(&handle.session_id) {
                return Err(PlatformError::Internal(format!(
                    "immersive session already exists: {}",
                    handle.session_id
                )));
            }
            sessions.insert(handle.session_id.clone(), session);
        }
        tracing::debug!(
            session_id = %handle.session_id,
            mode = %handle.mode,
            features = ?request.required_features,
            "simulated platform granted session"
        );

        let events: SessionEventStream = Box::new(SimulatedEventSubscription { output });
        Ok(GrantedSession { handle, events })
    }

    async fn end_session(&self, session: &ImmersiveSessionHandle) -> PlatformResult<()> {
        let session = self.remove_session(&session.session_id).await?;
        session.emit_terminal_event(SessionEvent::Ended(SessionEndedEvent {
            reason: Some("ended by application".to_owned()),
        }));
        tracing::debug!(session_id = %session.handle.session_id, "simulated session closed");
        Ok(())
    }
}

struct SimulatedEventSubscription {
    output: broadcast::Receiver<SessionEvent>,
}

#[async_trait]
impl SessionEventSubscription for SimulatedEventSubscription {
    async fn next_event(&mut self) -> PlatformResult<Option<SessionEvent>> {
        match self.output.recv().await {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(PlatformError::Internal(
                format!("simulated session stream lagged and dropped {skipped} events"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedMediaState {
    pub source: Option<SourceId>,
    pub options: Option<PlaybackOptions>,
    pub playing: bool,
    pub loads: u64,
    pub plays: u64,
    pub pauses: u64,
}

/// Video element double. Playback is refused while autoplay is blocked.
#[derive(Debug, Default)]
pub struct SimulatedMediaElement {
    block_autoplay: AtomicBool,
    load_error: Mutex<Option<String>>,
    state: Mutex<SimulatedMediaState>,
}

impl SimulatedMediaElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block_autoplay(&self, blocked: bool) {
        self.block_autoplay.store(blocked, Ordering::Relaxed);
    }

    pub fn set_load_error(&self, error: Option<String>) {
        *self.load_error.lock().expect("simulated media lock poisoned") = error;
    }

    pub fn state(&self) -> SimulatedMediaState {
        self.state
            .lock()
            .expect("simulated media lock poisoned")
            .clone()
    }
}

#[async_trait]
impl MediaElement for SimulatedMediaElement {
    fn set_source(&self, source: &SourceId) {
        let mut state = self.state.lock().expect("simulated media lock poisoned");
        state.source = Some(source.clone());
        state.playing = false;
    }

    fn configure(&self, options: &PlaybackOptions) {
        self.state
            .lock()
            .expect("simulated media lock poisoned")
            .options = Some(options.clone());
    }

    fn load(&self) -> PlatformResult<()> {
        if let Some(error) = self
            .load_error
            .lock()
            .expect("simulated media lock poisoned")
            .clone()
        {
            return Err(PlatformError::Media(error));
        }
        let mut state = self.state.lock().expect("simulated media lock poisoned");
        if state.source.is_none() {
            return Err(PlatformError::Media("no source assigned".to_owned()));
        }
        state.loads += 1;
        Ok(())
    }

    async fn play(&self) -> PlatformResult<()> {
        if self.block_autoplay.load(Ordering::Relaxed) {
            return Err(PlatformError::Rejected(AUTOPLAY_REJECTION.to_owned()));
        }
        let mut state = self.state.lock().expect("simulated media lock poisoned");
        state.plays += 1;
        state.playing = true;
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock().expect("simulated media lock poisoned");
        state.pauses += 1;
        state.playing = false;
    }

    fn is_paused(&self) -> bool {
        !self
            .state
            .lock()
            .expect("simulated media lock poisoned")
            .playing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedRenderFaults {
    pub create_context: Option<String>,
    /// Frame number (1-based) at which rendering starts failing.
    pub frame_failure_at: Option<u64>,
    pub bind_session: Option<String>,
}

#[derive(Debug, Default)]
pub struct SimulatedRenderEngine {
    faults: Mutex<SimulatedRenderFaults>,
    specs: Mutex<Vec<SceneSpec>>,
    bound_sessions: Mutex<Vec<ImmersiveSessionId>>,
    frames_rendered: AtomicU64,
}

impl SimulatedRenderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_faults(&self, faults: SimulatedRenderFaults) {
        *self.faults.lock().expect("simulated render lock poisoned") = faults;
    }

    pub fn contexts_created(&self) -> usize {
        self.specs
            .lock()
            .expect("simulated render lock poisoned")
            .len()
    }

    pub fn scene_specs(&self) -> Vec<SceneSpec> {
        self.specs
            .lock()
            .expect("simulated render lock poisoned")
            .clone()
    }

    pub fn bound_sessions(&self) -> Vec<ImmersiveSessionId> {
        self.bound_sessions
            .lock()
            .expect("simulated render lock poisoned")
            .clone()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    fn faults(&self) -> SimulatedRenderFaults {
        self.faults
            .lock()
            .expect("simulated render lock poisoned")
            .clone()
    }
}

impl RenderEngine for SimulatedRenderEngine {
    fn create_context(
        &self,
        spec: &SceneSpec,
        _video: Arc<dyn MediaElement>,
    ) -> PlatformResult<RenderContextId> {
        if let Some(error) = self.faults().create_context {
            return Err(PlatformError::Render(error));
        }
        let mut specs = self.specs.lock().expect("simulated render lock poisoned");
        specs.push(spec.clone());
        Ok(RenderContextId::new(format!("render-context-{}", specs.len())))
    }

    fn render_frame(&self, _context: &RenderContextId) -> PlatformResult<()> {
        let frame = self.frames_rendered.load(Ordering::Relaxed) + 1;
        if self
            .faults()
            .frame_failure_at
            .is_some_and(|failing| frame >= failing)
        {
            return Err(PlatformError::Render(format!("frame {frame} lost the GPU device")));
        }
        self.frames_rendered.store(frame, Ordering::Relaxed);
        Ok(())
    }

    fn bind_session(
        &self,
        _context: &RenderContextId,
        session: &ImmersiveSessionHandle,
    ) -> PlatformResult<()> {
        if let Some(error) = self.faults().bind_session {
            return Err(PlatformError::Render(error));
        }
        self.bound_sessions
            .lock()
            .expect("simulated render lock poisoned")
            .push(session.session_id.clone());
        Ok(())
    }
}
