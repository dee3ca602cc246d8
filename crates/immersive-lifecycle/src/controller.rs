use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use immersive_eventbus::{LifecycleEventBus, LifecycleEventSubscription};
use immersive_protocol::event::{LifecycleEvent, SessionEvent};
use immersive_protocol::ids::{ImmersiveSessionId, SourceId};
use immersive_protocol::media::{MediaElement, PlaybackOptions};
use immersive_protocol::platform::{ImmersivePlatform, SessionEventStream};
use immersive_protocol::render::{RenderEngine, SceneSpec};
use immersive_protocol::session::{ImmersiveSessionHandle, SessionRequest};
use immersive_protocol::state::{GoControlMode, SessionState};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::context::{GoControl, LifecycleContext, LifecycleSnapshot};
use crate::error::{
    LaunchError, SelectionResult, VR_UNSUPPORTED_MESSAGE, XR_API_MISSING_MESSAGE,
};
use crate::playback::{PlaybackController, UserGesture};
use crate::scene::{SceneBootstrapper, DEFAULT_FRAME_INTERVAL};
use crate::selection::{Catalog, CatalogKind, SelectionCoordinator};
use crate::status::{
    StatusReporter, CHECKING_SUPPORT_MESSAGE, ENTERING_VR_MESSAGE, SESSION_ENDED_MESSAGE,
    STARTING_VIDEO_MESSAGE,
};

const RESTART_END_REASON: &str = "ended for restart";

/// External notifications consumed by the lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleInput {
    SelectionChanged {
        catalog: CatalogKind,
        source: Option<SourceId>,
    },
    GoClicked,
    SessionEnded {
        session_id: ImmersiveSessionId,
        reason: Option<String>,
    },
}

/// What a Go click resolved to while the context lock was held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GoDecision {
    Ignored(SessionState),
    NoSelection,
    Launch,
    Restart,
}

pub struct LifecycleCollaborators {
    pub platform: Arc<dyn ImmersivePlatform>,
    pub media: Arc<dyn MediaElement>,
    pub engine: Arc<dyn RenderEngine>,
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub general: Catalog,
    pub special: Catalog,
    pub session_request: SessionRequest,
    pub playback: PlaybackOptions,
    pub scene: SceneSpec,
    pub frame_interval: Duration,
}

impl LifecycleSettings {
    pub fn new(general: Catalog, special: Catalog) -> Self {
        Self {
            general,
            special,
            session_request: SessionRequest::default(),
            playback: PlaybackOptions::default(),
            scene: SceneSpec::default(),
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LifecyclePerfSnapshot {
    pub go_clicks_total: u64,
    pub go_ignored_total: u64,
    pub attempts_total: u64,
    pub reentries_total: u64,
    pub no_selection_total: u64,
    pub unsupported_platform_total: u64,
    pub playback_blocked_total: u64,
    pub scene_failures_total: u64,
    pub session_request_failures_total: u64,
    pub sessions_granted_total: u64,
    pub sessions_ended_total: u64,
}

#[derive(Debug, Default)]
struct LifecyclePerfCounters {
    go_clicks_total: AtomicU64,
    go_ignored_total: AtomicU64,
    attempts_total: AtomicU64,
    reentries_total: AtomicU64,
    no_selection_total: AtomicU64,
    unsupported_platform_total: AtomicU64,
    playback_blocked_total: AtomicU64,
    scene_failures_total: AtomicU64,
    session_request_failures_total: AtomicU64,
    sessions_granted_total: AtomicU64,
    sessions_ended_total: AtomicU64,
}

impl LifecyclePerfCounters {
    fn record_failure(&self, error: &LaunchError) {
        let counter = match error {
            LaunchError::NoSelection => &self.no_selection_total,
            LaunchError::UnsupportedPlatform(_) => &self.unsupported_platform_total,
            LaunchError::PlaybackBlocked(_) => &self.playback_blocked_total,
            LaunchError::ScenePreparationFailed(_) => &self.scene_failures_total,
            LaunchError::SessionRequestFailed(_) => &self.session_request_failures_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LifecyclePerfSnapshot {
        LifecyclePerfSnapshot {
            go_clicks_total: self.go_clicks_total.load(Ordering::Relaxed),
            go_ignored_total: self.go_ignored_total.load(Ordering::Relaxed),
            attempts_total: self.attempts_total.load(Ordering::Relaxed),
            reentries_total: self.reentries_total.load(Ordering::Relaxed),
            no_selection_total: self.no_selection_total.load(Ordering::Relaxed),
            unsupported_platform_total: self.unsupported_platform_total.load(Ordering::Relaxed),
            playback_blocked_total: self.playback_blocked_total.load(Ordering::Relaxed),
            scene_failures_total: self.scene_failures_total.load(Ordering::Relaxed),
            session_request_failures_total: self
                .session_request_failures_total
                .load(Ordering::Relaxed),
            sessions_granted_total: self.sessions_granted_total.load(Ordering::Relaxed),
            sessions_ended_total: self.sessions_ended_total.load(Ordering::Relaxed),
        }
    }
}

/// Drives selection → support probe → video → scene → session, and tears the
/// session down again when the platform ends it or the user re-enters.
#[derive(Clone)]
pub struct SessionLifecycleManager {
    platform: Arc<dyn ImmersivePlatform>,
    playback: PlaybackController,
    scene: Arc<SceneBootstrapper>,
    status: Arc<StatusReporter>,
    eventbus: Arc<LifecycleEventBus>,
    context: Arc<Mutex<LifecycleContext>>,
    session_request: SessionRequest,
    session_watcher: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
    perf: Arc<LifecyclePerfCounters>,
}

impl SessionLifecycleManager {
    pub fn new(
        collaborators: LifecycleCollaborators,
        settings: LifecycleSettings,
        eventbus: Arc<LifecycleEventBus>,
    ) -> Self {
        let status = Arc::new(StatusReporter::new(Arc::clone(&eventbus)));
        let playback = PlaybackController::new(collaborators.media, settings.playback);
        let scene = Arc::new(SceneBootstrapper::new(
            collaborators.engine,
            playback.media(),
            settings.scene,
            settings.frame_interval,
            Arc::clone(&status),
            Arc::clone(&eventbus),
        ));
        let selection = SelectionCoordinator::new(settings.general, settings.special);

        Self {
            platform: collaborators.platform,
            playback,
            scene,
            status,
            eventbus,
            context: Arc::new(Mutex::new(LifecycleContext::new(selection))),
            session_request: settings.session_request,
            session_watcher: Arc::new(std::sync::Mutex::new(None)),
            perf: Arc::new(LifecyclePerfCounters::default()),
        }
    }

    /// Single entry point for every external notification.
    pub async fn dispatch(&self, input: LifecycleInput) -> SelectionResult<LifecycleSnapshot> {
        match input {
            LifecycleInput::SelectionChanged { catalog, source } => {
                self.apply_selection(catalog, source).await?;
            }
            LifecycleInput::GoClicked => self.handle_go().await,
            LifecycleInput::SessionEnded { session_id, reason } => {
                self.apply_session_end(&session_id, reason).await;
            }
        }
        Ok(self.snapshot().await)
    }

    pub async fn select(
        &self,
        catalog: CatalogKind,
        source: Option<SourceId>,
    ) -> SelectionResult<LifecycleSnapshot> {
        self.dispatch(LifecycleInput::SelectionChanged { catalog, source })
            .await
    }

    pub async fn go(&self) -> LifecycleSnapshot {
        self.handle_go().await;
        self.snapshot().await
    }

    pub async fn snapshot(&self) -> LifecycleSnapshot {
        let context = self.context.lock().await;
        context.snapshot(self.status.current())
    }

    pub async fn state(&self) -> SessionState {
        self.context.lock().await.state()
    }

    pub async fn catalog(&self, kind: CatalogKind) -> Catalog {
        self.context.lock().await.selection().catalog(kind).clone()
    }

    pub fn perf_snapshot(&self) -> LifecyclePerfSnapshot {
        self.perf.snapshot()
    }

    pub fn subscribe(&self) -> LifecycleEventSubscription {
        self.eventbus.subscribe()
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    pub fn scene(&self) -> &SceneBootstrapper {
        &self.scene
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    async fn apply_selection(
        &self,
        catalog: CatalogKind,
        source: Option<SourceId>,
    ) -> SelectionResult<()> {
        let change = {
            let mut context = self.context.lock().await;
            context.selection_mut().select(catalog, source)?
        };
        tracing::debug!(
            catalog = %change.catalog,
            selected = ?change.selected,
            cleared_other = ?change.cleared_other,
            "selection changed"
        );
        self.status.clear();
        Ok(())
    }

    async fn handle_go(&self) {
        self.perf.go_clicks_total.fetch_add(1, Ordering::Relaxed);
        // Checking and disabling Go happen under one lock so a second click
        // cannot slip in while the first one is still awaiting.
        let (decision, claimed) = {
            let mut context = self.context.lock().await;
            let go = context.go();
            let state = context.state();
            let decision = if !go.enabled {
                GoDecision::Ignored(state)
            } else if state == SessionState::Active {
                GoDecision::Restart
            } else if !state.accepts_launch() {
                GoDecision::Ignored(state)
            } else if context.selection().resolve().is_none() {
                GoDecision::NoSelection
            } else {
                GoDecision::Launch
            };
            let claimed = match decision {
                GoDecision::Restart | GoDecision::Launch => context.set_go(false, go.mode),
                GoDecision::Ignored(_) | GoDecision::NoSelection => None,
            };
            (decision, claimed)
        };
        self.publish_go(claimed);

        let gesture = UserGesture::from_go_click();
        match decision {
            GoDecision::Ignored(state) => {
                self.perf.go_ignored_total.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(state = %state, "go ignored while an attempt is in flight");
            }
            GoDecision::NoSelection => self.reject_without_selection().await,
            GoDecision::Restart => {
                self.perf.reentries_total.fetch_add(1, Ordering::Relaxed);
                self.end_active_session_for_restart().await;
                self.run_attempt(&gesture).await;
            }
            GoDecision::Launch => self.run_attempt(&gesture).await,
        }
    }

    async fn reject_without_selection(&self) {
        let error = LaunchError::NoSelection;
        self.perf.record_failure(&error);
        self.status.set(error.status_message());
        self.context.lock().await.record_failure(error);
        self.set_go(true, GoControlMode::Enter).await;
    }

    /// Runs one launch attempt. Go is already disabled by the caller.
    async fn run_attempt(&self, gesture: &UserGesture) {
        self.status.clear();

        let source = {
            let context = self.context.lock().await;
            context.selection().resolve().cloned()
        };
        let Some(source) = source else {
            self.reject_without_selection().await;
            return;
        };

        self.perf.attempts_total.fetch_add(1, Ordering::Relaxed);
        let attempt = {
            let mut context = self.context.lock().await;
            context.begin_attempt()
        };
        tracing::info!(source = %source, attempt, "launch attempt started");
        self.set_go(false, GoControlMode::Enter).await;
        if !self.advance(SessionState::CheckingSupport).await {
            return;
        }
        self.status.set(CHECKING_SUPPORT_MESSAGE);

        if let Err(error) = self.probe_support().await {
            self.fail(error, false).await;
            return;
        }

        if !self.advance(SessionState::StartingVideo).await {
            return;
        }
        self.status.set(STARTING_VIDEO_MESSAGE);
        if let Err(error) = self.playback.start(gesture, &source).await {
            self.fail(error, false).await;
            return;
        }

        if !self.advance(SessionState::PreparingScene).await {
            return;
        }
        if let Err(error) = self.scene.ensure_ready().await {
            self.fail(error, true).await;
            return;
        }

        if !self.advance(SessionState::RequestingSession).await {
            return;
        }
        self.status.set(ENTERING_VR_MESSAGE);
        let granted = match self
            .platform
            .request_session(self.session_request.clone())
            .await
        {
            Ok(granted) => granted,
            Err(error) => {
                tracing::warn!(error = %error, "platform refused the immersive session");
                self.fail(LaunchError::session_denied(&error), true).await;
                return;
            }
        };

        if let Err(error) = self.scene.bind_session(&granted.handle) {
            tracing::error!(
                session_id = %granted.handle.session_id,
                error = %error,
                "could not bind session to renderer"
            );
            self.end_platform_session(&granted.handle).await;
            self.fail(
                LaunchError::SessionRequestFailed(format!(
                    "Unable to attach the VR session to the renderer: {}",
                    error.message()
                )),
                true,
            )
            .await;
            return;
        }

        let session_id = granted.handle.session_id.clone();
        let activated = {
            let mut context = self.context.lock().await;
            let activated = context.transition(SessionState::Active);
            if activated.is_ok() {
                context.set_active_session(granted.handle.clone());
            }
            activated
        };
        match activated {
            Ok(from) => self.publish_transition(from, SessionState::Active),
            Err(error) => {
                tracing::error!(session_id = %session_id, error = %error, "refusing session activation");
                self.end_platform_session(&granted.handle).await;
                self.playback.stop();
                self.set_go(true, GoControlMode::Enter).await;
                return;
            }
        }
        self.status.clear();
        self.set_go(true, GoControlMode::EndAndRestart).await;
        self.perf
            .sessions_granted_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(session_id = %session_id, source = %source, attempt, "immersive session active");

        self.watch_session(session_id, granted.events);
    }

    async fn probe_support(&self) -> Result<(), LaunchError> {
        if !self.platform.is_api_available() {
            return Err(LaunchError::UnsupportedPlatform(
                XR_API_MISSING_MESSAGE.to_owned(),
            ));
        }

        match self
            .platform
            .is_session_supported(self.session_request.mode)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(LaunchError::UnsupportedPlatform(
                VR_UNSUPPORTED_MESSAGE.to_owned(),
            )),
            Err(error) => {
                tracing::warn!(error = %error, "support probe errored");
                Err(LaunchError::probe_errored(&error))
            }
        }
    }

    async fn fail(&self, error: LaunchError, stop_video: bool) {
        if stop_video {
            self.playback.stop();
        }
        self.perf.record_failure(&error);
        tracing::warn!(kind = error.kind(), error = %error, "launch attempt failed");
        self.status.set(error.status_message());
        self.context.lock().await.record_failure(error);
        self.transition(SessionState::Failed).await;
        self.set_go(true, GoControlMode::Enter).await;
    }

    async fn end_platform_session(&self, handle: &ImmersiveSessionHandle) {
        if let Err(error) = self.platform.end_session(handle).await {
            tracing::warn!(
                session_id = %handle.session_id,
                error = %error,
                "platform failed to end session"
            );
        }
    }

    /// Ends the active session ahead of a new attempt. Go stays disabled.
    async fn end_active_session_for_restart(&self) {
        self.abort_session_watcher();
        let handle = {
            let context = self.context.lock().await;
            context.active_session().cloned()
        };
        let Some(handle) = handle else {
            return;
        };

        self.end_platform_session(&handle).await;
        self.apply_session_end(&handle.session_id, Some(RESTART_END_REASON.to_owned()))
            .await;
    }

    /// Applies the Active → Ended transition. Notifications for a session
    /// that is no longer active are ignored.
    async fn apply_session_end(&self, session_id: &ImmersiveSessionId, reason: Option<String>) {
        let (from, go_changed) = {
            let mut context = self.context.lock().await;
            let is_current = context
                .active_session()
                .is_some_and(|handle| &handle.session_id == session_id);
            if !is_current || context.state() != SessionState::Active {
                tracing::debug!(session_id = %session_id, "ignoring stale session end");
                return;
            }
            let from = match context.transition(SessionState::Ended) {
                Ok(from) => from,
                Err(error) => {
                    tracing::error!(session_id = %session_id, error = %error, "refusing session end");
                    return;
                }
            };
            context.take_active_session();
            // A disabled Go while Active means a restart owns the control.
            let go_changed = if context.go().enabled {
                context.set_go(true, GoControlMode::Enter)
            } else {
                None
            };
            (from, go_changed)
        };
        self.publish_transition(from, SessionState::Ended);

        // Detach rather than abort: this may be running on the watcher task.
        drop(self.take_session_watcher());
        self.playback.stop();
        self.status.set(SESSION_ENDED_MESSAGE);
        self.publish_go(go_changed);
        self.perf
            .sessions_ended_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(session_id = %session_id, reason = ?reason, "immersive session ended");
    }

    fn watch_session(&self, session_id: ImmersiveSessionId, mut events: SessionEventStream) {
        let manager = self.clone();
        let watched_id = session_id.clone();
        let task = tokio::spawn(async move {
            let reason = loop {
                match events.next_event().await {
                    Ok(Some(SessionEvent::Ended(ended))) => break ended.reason,
                    Ok(Some(SessionEvent::VisibilityChanged(visibility))) => {
                        tracing::debug!(
                            session_id = %watched_id,
                            visibility = ?visibility,
                            "session visibility changed"
                        );
                    }
                    Ok(None) => break Some("session event stream closed".to_owned()),
                    Err(error) => break Some(format!("session event stream failed: {error}")),
                }
            };
            manager.apply_session_end(&watched_id, reason).await;
        });

        let previous = self
            .session_watcher
            .lock()
            .expect("session watcher lock poisoned")
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn take_session_watcher(&self) -> Option<JoinHandle<()>> {
        self.session_watcher
            .lock()
            .expect("session watcher lock poisoned")
            .take()
    }

    fn abort_session_watcher(&self) {
        if let Some(task) = self.take_session_watcher() {
            task.abort();
        }
    }

    async fn transition(&self, next: SessionState) -> bool {
        let result = self.context.lock().await.transition(next);
        match result {
            Ok(from) => {
                self.publish_transition(from, next);
                true
            }
            Err(error) => {
                tracing::error!(error = %error, "refusing session transition");
                false
            }
        }
    }

    /// Steps the attempt forward; on a refused step the attempt stops and Go
    /// is handed back.
    async fn advance(&self, next: SessionState) -> bool {
        if self.transition(next).await {
            return true;
        }
        self.set_go(true, GoControlMode::Enter).await;
        false
    }

    fn publish_transition(&self, from: SessionState, to: SessionState) {
        tracing::debug!(from = %from, to = %to, "session state changed");
        self.eventbus
            .publish(LifecycleEvent::StateChanged { from, to });
    }

    async fn set_go(&self, enabled: bool, mode: GoControlMode) {
        let changed = self.context.lock().await.set_go(enabled, mode);
        self.publish_go(changed);
    }

    fn publish_go(&self, changed: Option<GoControl>) {
        if let Some(go) = changed {
            self.eventbus.publish(LifecycleEvent::GoControlChanged {
                enabled: go.enabled,
                mode: go.mode,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use immersive_eventbus::LifecycleEventBus;
    use immersive_protocol::error::{PlatformError, PlatformResult};
    use immersive_protocol::event::{LifecycleEvent, SessionEndedEvent, SessionEvent};
    use immersive_protocol::ids::{ImmersiveSessionId, RenderContextId, SourceId};
    use immersive_protocol::media::{MediaElement, PlaybackOptions};
    use immersive_protocol::platform::{
        GrantedSession, ImmersivePlatform, PlatformKind, SessionEventSubscription,
    };
    use immersive_protocol::render::{RenderEngine, SceneSpec};
    use immersive_protocol::session::{ImmersiveSessionHandle, SessionMode, SessionRequest};
    use immersive_protocol::state::{GoControlMode, SessionState};
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    use super::{LifecycleCollaborators, LifecycleInput, LifecycleSettings, SessionLifecycleManager};
    use crate::error::{LaunchError, SelectionError};
    use crate::selection::{Catalog, CatalogEntry, CatalogKind};
    use crate::status::SESSION_ENDED_MESSAGE;

    type EventSender = mpsc::UnboundedSender<PlatformResult<Option<SessionEvent>>>;

    #[derive(Default)]
    struct MockPlatform {
        state: Mutex<MockPlatformState>,
    }

    #[derive(Default)]
    struct MockPlatformState {
        probe: VecDeque<PlatformResult<bool>>,
        deny_next_request: Option<PlatformError>,
        next_session: usize,
        senders: Vec<(ImmersiveSessionId, EventSender)>,
        requests: Vec<SessionRequest>,
        ended: Vec<ImmersiveSessionId>,
        calls: Vec<&'static str>,
        end_delay: Option<Duration>,
    }

    impl MockPlatform {
        fn emit(&self, index: usize, event: SessionEvent) {
            let sender = self.state.lock().expect("platform state").senders[index]
                .1
                .clone();
            sender.send(Ok(Some(event))).expect("emit session event");
        }
    }

    struct MockEvents {
        receiver: mpsc::UnboundedReceiver<PlatformResult<Option<SessionEvent>>>,
    }

    #[async_trait]
    impl SessionEventSubscription for MockEvents {
        async fn next_event(&mut self) -> PlatformResult<Option<SessionEvent>> {
            match self.receiver.recv().await {
                Some(event) => event,
                None => Ok(None),
            }
        }
    }

    #[async_trait]
    impl ImmersivePlatform for MockPlatform {
        fn kind(&self) -> PlatformKind {
            PlatformKind::Other("mock".to_owned())
        }

        async fn is_session_supported(&self, mode: SessionMode) -> PlatformResult<bool> {
            let mut state = self.state.lock().expect("platform state");
            state.calls.push("probe");
            assert_eq!(mode, SessionMode::ImmersiveVr);
            state.probe.pop_front().unwrap_or(Ok(true))
        }

        async fn request_session(
            &self,
            request: SessionRequest,
        ) -> PlatformResult<GrantedSession> {
            let mut state = self.state.lock().expect("platform state");
            state.calls.push("request");
            state.requests.push(request.clone());
            if let Some(error) = state.deny_next_request.take() {
                return Err(error);
            }
            state.next_session += 1;
            let session_id = ImmersiveSessionId::new(format!("xr-{}", state.next_session));
            let (sender, receiver) = mpsc::unbounded_channel();
            state.senders.push((session_id.clone(), sender));
            Ok(GrantedSession {
                handle: ImmersiveSessionHandle {
                    session_id,
                    mode: request.mode,
                },
                events: Box::new(MockEvents { receiver }),
            })
        }

        async fn end_session(&self, session: &ImmersiveSessionHandle) -> PlatformResult<()> {
            let delay = self.state.lock().expect("platform state").end_delay;
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            let mut state = self.state.lock().expect("platform state");
            state.calls.push("end");
            state.ended.push(session.session_id.clone());
            let sender = state
                .senders
                .iter()
                .find(|(id, _)| id == &session.session_id)
                .map(|(_, sender)| sender.clone());
            if let Some(sender) = sender {
                let _ = sender.send(Ok(Some(SessionEvent::Ended(SessionEndedEvent {
                    reason: Some("ended by app".to_owned()),
                }))));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockMedia {
        state: Mutex<MockMediaState>,
    }

    #[derive(Default)]
    struct MockMediaState {
        source: Option<SourceId>,
        playing: bool,
        reject_play: bool,
        plays: usize,
    }

    #[async_trait]
    impl MediaElement for MockMedia {
        fn set_source(&self, source: &SourceId) {
            self.state.lock().expect("media state").source = Some(source.clone());
        }

        fn configure(&self, _options: &PlaybackOptions) {}

        fn load(&self) -> PlatformResult<()> {
            Ok(())
        }

        async fn play(&self) -> PlatformResult<()> {
            let mut state = self.state.lock().expect("media state");
            if state.reject_play {
                return Err(PlatformError::Rejected("NotAllowedError".to_owned()));
            }
            state.plays += 1;
            state.playing = true;
            Ok(())
        }

        fn pause(&self) {
            self.state.lock().expect("media state").playing = false;
        }

        fn is_paused(&self) -> bool {
            !self.state.lock().expect("media state").playing
        }
    }

    #[derive(Default)]
    struct MockEngine {
        contexts: AtomicUsize,
        fail_bind: Mutex<bool>,
    }

    impl RenderEngine for MockEngine {
        fn create_context(
            &self,
            _spec: &SceneSpec,
            _video: Arc<dyn MediaElement>,
        ) -> PlatformResult<RenderContextId> {
            self.contexts.fetch_add(1, Ordering::Relaxed);
            Ok(RenderContextId::new("ctx"))
        }

        fn render_frame(&self, _context: &RenderContextId) -> PlatformResult<()> {
            Ok(())
        }

        fn bind_session(
            &self,
            _context: &RenderContextId,
            _session: &ImmersiveSessionHandle,
        ) -> PlatformResult<()> {
            if *self.fail_bind.lock().expect("bind flag") {
                return Err(PlatformError::Render("layer creation failed".to_owned()));
            }
            Ok(())
        }
    }

    struct Harness {
        platform: Arc<MockPlatform>,
        media: Arc<MockMedia>,
        engine: Arc<MockEngine>,
        manager: SessionLifecycleManager,
    }

    fn harness() -> Harness {
        let platform = Arc::new(MockPlatform::default());
        let media = Arc::new(MockMedia::default());
        let engine = Arc::new(MockEngine::default());
        let mut settings = LifecycleSettings::new(
            Catalog::new(
                CatalogKind::General,
                vec![CatalogEntry::new("G1", "Reef"), CatalogEntry::new("G2", "Canyon")],
            ),
            Catalog::new(CatalogKind::Special, vec![CatalogEntry::new("S1", "Ward tour")]),
        );
        settings.frame_interval = Duration::from_millis(5);
        let manager = SessionLifecycleManager::new(
            LifecycleCollaborators {
                platform: platform.clone(),
                media: media.clone(),
                engine: engine.clone(),
            },
            settings,
            Arc::new(LifecycleEventBus::default()),
        );
        Harness {
            platform,
            media,
            engine,
            manager,
        }
    }

    async fn wait_for_state(manager: &SessionLifecycleManager, expected: SessionState) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let state = manager.state().await;
            if state == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {expected:?}; observed {state:?}"
            );
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn successful_attempt_walks_every_state_in_order() {
        let harness = harness();
        let mut events = harness.manager.subscribe();
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");

        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.status, None);
        assert_eq!(snapshot.active_session, Some(ImmersiveSessionId::new("xr-1")));
        assert!(snapshot.go.enabled);
        assert_eq!(snapshot.go.mode, GoControlMode::EndAndRestart);
        assert_eq!(
            harness.media.state.lock().expect("media").source,
            Some(SourceId::new("G1"))
        );

        let states = events
            .drain()
            .into_iter()
            .filter_map(|envelope| match envelope.event {
                LifecycleEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            states,
            vec![
                SessionState::CheckingSupport,
                SessionState::StartingVideo,
                SessionState::PreparingScene,
                SessionState::RequestingSession,
                SessionState::Active,
            ]
        );
        assert_eq!(
            harness.platform.state.lock().expect("platform").requests,
            vec![SessionRequest::default()]
        );
    }

    #[tokio::test]
    async fn probe_runs_before_any_media_work() {
        let harness = harness();
        harness
            .platform
            .state
            .lock()
            .expect("platform")
            .probe
            .push_back(Ok(false));
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");

        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.state, SessionState::Failed);
        assert_eq!(
            snapshot.status.as_deref(),
            Some("Immersive VR not supported on this device.")
        );
        assert!(snapshot.go.enabled);
        assert_eq!(harness.media.state.lock().expect("media").source, None);
        assert_eq!(harness.engine.contexts.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn probe_error_is_treated_as_unsupported() {
        let harness = harness();
        harness
            .platform
            .state
            .lock()
            .expect("platform")
            .probe
            .push_back(Err(PlatformError::Internal("SecurityError".to_owned())));
        harness
            .manager
            .select(CatalogKind::Special, Some("S1".into()))
            .await
            .expect("select");

        let snapshot = harness.manager.go().await;

        assert_eq!(
            snapshot.last_failure,
            Some(LaunchError::UnsupportedPlatform(
                "Unable to check immersive VR support: SecurityError".to_owned()
            ))
        );
        assert!(snapshot.go.enabled);
    }

    #[tokio::test]
    async fn session_denial_pauses_video_and_reports_platform_message() {
        let harness = harness();
        harness
            .platform
            .state
            .lock()
            .expect("platform")
            .deny_next_request = Some(PlatformError::Rejected(
            "The user denied permission.".to_owned(),
        ));
        harness
            .manager
            .select(CatalogKind::General, Some("G2".into()))
            .await
            .expect("select");

        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.state, SessionState::Failed);
        assert_eq!(snapshot.status.as_deref(), Some("The user denied permission."));
        assert!(snapshot.go.enabled);
        assert!(harness.media.is_paused());
    }

    #[tokio::test]
    async fn empty_denial_message_falls_back_to_generic_text() {
        let harness = harness();
        harness
            .platform
            .state
            .lock()
            .expect("platform")
            .deny_next_request = Some(PlatformError::Rejected(String::new()));
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");

        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.status.as_deref(), Some("Unable to start the VR session."));
    }

    #[tokio::test]
    async fn bind_failure_ends_granted_session_and_fails_attempt() {
        let harness = harness();
        *harness.engine.fail_bind.lock().expect("bind flag") = true;
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");

        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.state, SessionState::Failed);
        assert_eq!(snapshot.active_session, None);
        assert!(matches!(
            snapshot.last_failure,
            Some(LaunchError::SessionRequestFailed(_))
        ));
        assert_eq!(
            harness.platform.state.lock().expect("platform").ended,
            vec![ImmersiveSessionId::new("xr-1")]
        );
    }

    #[tokio::test]
    async fn platform_end_moves_to_ended_and_pauses_video() {
        let harness = harness();
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");
        harness.manager.go().await;

        harness.platform.emit(
            0,
            SessionEvent::Ended(SessionEndedEvent {
                reason: Some("headset removed".to_owned()),
            }),
        );
        wait_for_state(&harness.manager, SessionState::Ended).await;

        let snapshot = harness.manager.snapshot().await;
        assert_eq!(snapshot.status.as_deref(), Some(SESSION_ENDED_MESSAGE));
        assert_eq!(snapshot.active_session, None);
        assert!(snapshot.go.enabled);
        assert_eq!(snapshot.go.mode, GoControlMode::Enter);
        assert!(harness.media.is_paused());
        assert_eq!(harness.manager.perf_snapshot().sessions_ended_total, 1);
    }

    #[tokio::test]
    async fn visibility_changes_do_not_end_the_session() {
        let harness = harness();
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");
        harness.manager.go().await;

        harness.platform.emit(
            0,
            SessionEvent::VisibilityChanged(
                immersive_protocol::event::SessionVisibility::VisibleBlurred,
            ),
        );
        sleep(Duration::from_millis(20)).await;

        assert_eq!(harness.manager.state().await, SessionState::Active);
    }

    #[tokio::test]
    async fn go_while_active_ends_session_then_relaunches() {
        let harness = harness();
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");
        harness.manager.go().await;
        harness
            .manager
            .select(CatalogKind::Special, Some("S1".into()))
            .await
            .expect("switch selection");

        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.active_session, Some(ImmersiveSessionId::new("xr-2")));
        assert_eq!(snapshot.attempt, 2);
        assert_eq!(
            harness.media.state.lock().expect("media").source,
            Some(SourceId::new("S1"))
        );
        let platform = harness.platform.state.lock().expect("platform");
        assert_eq!(platform.ended, vec![ImmersiveSessionId::new("xr-1")]);
        assert_eq!(
            platform.calls,
            vec!["probe", "request", "end", "probe", "request"]
        );
        assert_eq!(harness.engine.contexts.load(Ordering::Relaxed), 1);
        assert_eq!(harness.manager.perf_snapshot().reentries_total, 1);
    }

    #[tokio::test]
    async fn second_go_during_restart_teardown_is_ignored() {
        let harness = harness();
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");
        harness.manager.go().await;
        harness.platform.state.lock().expect("platform").end_delay =
            Some(Duration::from_millis(10));

        let (first, second) = tokio::join!(harness.manager.go(), harness.manager.go());

        assert!(!second.go.enabled);
        assert_eq!(first.state, SessionState::Active);
        assert_eq!(first.active_session, Some(ImmersiveSessionId::new("xr-2")));
        assert_eq!(first.go.mode, GoControlMode::EndAndRestart);
        let perf = harness.manager.perf_snapshot();
        assert_eq!(perf.go_ignored_total, 1);
        assert_eq!(perf.reentries_total, 1);
        assert_eq!(perf.attempts_total, 2);
        assert_eq!(perf.sessions_granted_total, 2);
        let platform = harness.platform.state.lock().expect("platform");
        assert_eq!(platform.ended, vec![ImmersiveSessionId::new("xr-1")]);
        assert_eq!(platform.requests.len(), 2);
    }

    #[tokio::test]
    async fn restart_keeps_go_disabled_until_the_new_attempt_settles() {
        let harness = harness();
        let mut events = harness.manager.subscribe();
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");
        harness.manager.go().await;
        events.drain();

        harness.manager.go().await;

        let go_changes = events
            .drain()
            .into_iter()
            .filter_map(|envelope| match envelope.event {
                LifecycleEvent::GoControlChanged { enabled, mode } => Some((enabled, mode)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            go_changes,
            vec![
                (false, GoControlMode::EndAndRestart),
                (false, GoControlMode::Enter),
                (true, GoControlMode::EndAndRestart),
            ]
        );
    }

    #[tokio::test]
    async fn restart_without_selection_ends_session_and_hands_go_back() {
        let harness = harness();
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");
        harness.manager.go().await;
        harness
            .manager
            .select(CatalogKind::General, None)
            .await
            .expect("clear selection");

        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.state, SessionState::Ended);
        assert_eq!(snapshot.active_session, None);
        assert_eq!(snapshot.status.as_deref(), Some("Please select one simulation."));
        assert!(snapshot.go.enabled);
        assert_eq!(snapshot.go.mode, GoControlMode::Enter);
    }

    #[tokio::test]
    async fn stale_end_notification_is_ignored() {
        let harness = harness();
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");
        harness.manager.go().await;

        let snapshot = harness
            .manager
            .dispatch(LifecycleInput::SessionEnded {
                session_id: ImmersiveSessionId::new("xr-99"),
                reason: None,
            })
            .await
            .expect("dispatch");

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.active_session, Some(ImmersiveSessionId::new("xr-1")));
    }

    #[tokio::test]
    async fn selection_change_clears_stale_failure_message() {
        let harness = harness();
        let snapshot = harness.manager.go().await;
        assert_eq!(snapshot.status.as_deref(), Some("Please select one simulation."));
        assert_eq!(snapshot.state, SessionState::Idle);

        let snapshot = harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");

        assert_eq!(snapshot.status, None);
        assert_eq!(snapshot.selection, Some(SourceId::new("G1")));
    }

    #[tokio::test]
    async fn unknown_source_is_rejected_by_dispatch() {
        let harness = harness();

        let error = harness
            .manager
            .select(CatalogKind::Special, Some("G1".into()))
            .await
            .expect_err("G1 is a general source");

        assert!(matches!(error, SelectionError::UnknownSource { .. }));
        assert_eq!(harness.manager.snapshot().await.selection, None);
    }

    #[tokio::test]
    async fn go_is_ignored_while_disabled() {
        let harness = harness();
        harness
            .manager
            .context
            .lock()
            .await
            .set_go(false, GoControlMode::Enter);

        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");
        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(harness.manager.perf_snapshot().go_ignored_total, 1);
        assert!(harness.platform.state.lock().expect("platform").calls.is_empty());
    }

    #[tokio::test]
    async fn blocked_playback_leaves_scene_untouched() {
        let harness = harness();
        harness.media.state.lock().expect("media").reject_play = true;
        harness
            .manager
            .select(CatalogKind::General, Some("G1".into()))
            .await
            .expect("select");

        let snapshot = harness.manager.go().await;

        assert_eq!(snapshot.state, SessionState::Failed);
        assert!(matches!(
            snapshot.last_failure,
            Some(LaunchError::PlaybackBlocked(_))
        ));
        assert_eq!(harness.engine.contexts.load(Ordering::Relaxed), 0);
        assert_eq!(harness.media.state.lock().expect("media").plays, 0);
    }
}
