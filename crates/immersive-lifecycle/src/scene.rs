use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use immersive_eventbus::LifecycleEventBus;
use immersive_protocol::error::{PlatformError, PlatformResult};
use immersive_protocol::event::LifecycleEvent;
use immersive_protocol::ids::RenderContextId;
use immersive_protocol::media::MediaElement;
use immersive_protocol::render::{RenderEngine, SceneSpec};
use immersive_protocol::session::ImmersiveSessionHandle;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::LaunchError;
use crate::status::StatusReporter;

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Camera, sphere and render loop built by the engine. Lives for the rest of
/// the process once created.
#[derive(Debug)]
pub struct SceneContext {
    context_id: RenderContextId,
    frames_rendered: AtomicU64,
    render_loop_running: AtomicBool,
}

impl SceneContext {
    pub fn context_id(&self) -> &RenderContextId {
        &self.context_id
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    pub fn is_render_loop_running(&self) -> bool {
        self.render_loop_running.load(Ordering::Relaxed)
    }
}

pub struct SceneBootstrapper {
    engine: Arc<dyn RenderEngine>,
    video: Arc<dyn MediaElement>,
    spec: SceneSpec,
    frame_interval: Duration,
    status: Arc<StatusReporter>,
    eventbus: Arc<LifecycleEventBus>,
    context: OnceCell<Arc<SceneContext>>,
    render_loops_started: AtomicUsize,
    render_task: Mutex<Option<JoinHandle<()>>>,
}

impl SceneBootstrapper {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        video: Arc<dyn MediaElement>,
        spec: SceneSpec,
        frame_interval: Duration,
        status: Arc<StatusReporter>,
        eventbus: Arc<LifecycleEventBus>,
    ) -> Self {
        Self {
            engine,
            video,
            spec,
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            status,
            eventbus,
            context: OnceCell::new(),
            render_loops_started: AtomicUsize::new(0),
            render_task: Mutex::new(None),
        }
    }

    /// Builds the scene and starts the render loop on first call; every later
    /// call returns the same context.
    pub async fn ensure_ready(&self) -> Result<Arc<SceneContext>, LaunchError> {
        let context = self
            .context
            .get_or_try_init(|| async {
                let context_id = self
                    .engine
                    .create_context(&self.spec, Arc::clone(&self.video))
                    .map_err(|error| {
                        tracing::error!(error = %error, "render engine could not build the scene");
                        LaunchError::scene_failed(&error)
                    })?;
                tracing::info!(
                    context = %context_id,
                    radius = self.spec.sphere.radius,
                    inward_facing = self.spec.sphere.inward_facing,
                    "scene constructed"
                );
                let context = Arc::new(SceneContext {
                    context_id,
                    frames_rendered: AtomicU64::new(0),
                    render_loop_running: AtomicBool::new(true),
                });
                self.start_render_loop(Arc::clone(&context));
                Ok::<_, LaunchError>(context)
            })
            .await?;
        Ok(Arc::clone(context))
    }

    pub fn context(&self) -> Option<Arc<SceneContext>> {
        self.context.get().cloned()
    }

    pub fn bind_session(&self, session: &ImmersiveSessionHandle) -> PlatformResult<()> {
        let context = self.context.get().ok_or_else(|| {
            PlatformError::Internal("scene must be prepared before binding a session".to_owned())
        })?;
        self.engine.bind_session(&context.context_id, session)?;
        tracing::debug!(
            context = %context.context_id,
            session_id = %session.session_id,
            "session bound to renderer"
        );
        Ok(())
    }

    pub fn render_loops_started(&self) -> usize {
        self.render_loops_started.load(Ordering::Relaxed)
    }

    fn start_render_loop(&self, context: Arc<SceneContext>) {
        self.render_loops_started.fetch_add(1, Ordering::Relaxed);
        let engine = Arc::clone(&self.engine);
        let status = Arc::clone(&self.status);
        let eventbus = Arc::clone(&self.eventbus);
        let frame_interval = self.frame_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(error) = engine.render_frame(&context.context_id) {
                    context.render_loop_running.store(false, Ordering::Relaxed);
                    tracing::error!(
                        context = %context.context_id,
                        frames = context.frames_rendered(),
                        error = %error,
                        "render loop stopped"
                    );
                    let reason = error.message().to_owned();
                    status.set(format!("Rendering stopped: {reason}"));
                    eventbus.publish(LifecycleEvent::RenderLoopFaulted { reason });
                    break;
                }
                context.frames_rendered.fetch_add(1, Ordering::Relaxed);
            }
        });

        *self.render_task.lock().expect("render task lock poisoned") = Some(task);
    }
}

impl Drop for SceneBootstrapper {
    fn drop(&mut self) {
        if let Ok(mut task) = self.render_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use immersive_eventbus::LifecycleEventBus;
    use immersive_protocol::error::{PlatformError, PlatformResult};
    use immersive_protocol::event::LifecycleEvent;
    use immersive_protocol::ids::{ImmersiveSessionId, RenderContextId, SourceId};
    use immersive_protocol::media::{MediaElement, PlaybackOptions};
    use immersive_protocol::render::{RenderEngine, SceneSpec};
    use immersive_protocol::session::{ImmersiveSessionHandle, SessionMode};
    use tokio::time::sleep;

    use super::SceneBootstrapper;
    use crate::error::LaunchError;
    use crate::status::StatusReporter;

    const FRAME: Duration = Duration::from_millis(1);

    struct NullMedia;

    #[async_trait]
    impl MediaElement for NullMedia {
        fn set_source(&self, _source: &SourceId) {}
        fn configure(&self, _options: &PlaybackOptions) {}
        fn load(&self) -> PlatformResult<()> {
            Ok(())
        }
        async fn play(&self) -> PlatformResult<()> {
            Ok(())
        }
        fn pause(&self) {}
        fn is_paused(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct MockEngine {
        contexts_created: AtomicUsize,
        frames: AtomicUsize,
        fail_create: AtomicBool,
        fail_frames: AtomicBool,
        bound: Mutex<Vec<ImmersiveSessionId>>,
        last_spec: Mutex<Option<SceneSpec>>,
    }

    impl RenderEngine for MockEngine {
        fn create_context(
            &self,
            spec: &SceneSpec,
            _video: Arc<dyn MediaElement>,
        ) -> PlatformResult<RenderContextId> {
            if self.fail_create.load(Ordering::Relaxed) {
                return Err(PlatformError::Render("no GL context".to_owned()));
            }
            let index = self.contexts_created.fetch_add(1, Ordering::Relaxed);
            *self.last_spec.lock().expect("spec lock") = Some(spec.clone());
            Ok(RenderContextId::new(format!("ctx-{index}")))
        }

        fn render_frame(&self, _context: &RenderContextId) -> PlatformResult<()> {
            if self.fail_frames.load(Ordering::Relaxed) {
                return Err(PlatformError::Render("context lost".to_owned()));
            }
            self.frames.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn bind_session(
            &self,
            _context: &RenderContextId,
            session: &ImmersiveSessionHandle,
        ) -> PlatformResult<()> {
            self.bound
                .lock()
                .expect("bound lock")
                .push(session.session_id.clone());
            Ok(())
        }
    }

    fn bootstrapper(engine: Arc<MockEngine>, eventbus: Arc<LifecycleEventBus>) -> SceneBootstrapper {
        let status = Arc::new(StatusReporter::new(Arc::clone(&eventbus)));
        SceneBootstrapper::new(
            engine,
            Arc::new(NullMedia),
            SceneSpec::default(),
            FRAME,
            status,
            eventbus,
        )
    }

    #[tokio::test]
    async fn ensure_ready_is_idempotent() {
        let engine = Arc::new(MockEngine::default());
        let scene = bootstrapper(engine.clone(), Arc::new(LifecycleEventBus::default()));

        let first = scene.ensure_ready().await.expect("first init");
        let second = scene.ensure_ready().await.expect("second init");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.context_id(), &RenderContextId::new("ctx-0"));
        assert_eq!(engine.contexts_created.load(Ordering::Relaxed), 1);
        assert_eq!(scene.render_loops_started(), 1);

        let spec = engine.last_spec.lock().expect("spec lock").clone().expect("spec");
        assert!(spec.sphere.inward_facing);
        assert_eq!(spec.sphere.width_segments, 64);
    }

    #[tokio::test]
    async fn render_loop_keeps_drawing_frames() {
        let engine = Arc::new(MockEngine::default());
        let scene = bootstrapper(engine.clone(), Arc::new(LifecycleEventBus::default()));
        let context = scene.ensure_ready().await.expect("init");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while context.frames_rendered() < 3 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for rendered frames"
            );
            sleep(Duration::from_millis(5)).await;
        }
        assert!(context.is_render_loop_running());
    }

    #[tokio::test]
    async fn failed_frame_stops_loop_and_reports_status() {
        let engine = Arc::new(MockEngine::default());
        engine.fail_frames.store(true, Ordering::Relaxed);
        let eventbus = Arc::new(LifecycleEventBus::default());
        let mut subscriber = eventbus.subscribe();
        let scene = bootstrapper(engine.clone(), Arc::clone(&eventbus));
        let context = scene.ensure_ready().await.expect("init");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while context.is_render_loop_running() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for render loop to stop"
            );
            sleep(Duration::from_millis(5)).await;
        }
        // Let the task finish publishing after flipping the flag.
        sleep(Duration::from_millis(20)).await;

        let events = subscriber
            .drain()
            .into_iter()
            .map(|envelope| envelope.event)
            .collect::<Vec<_>>();
        assert!(events.contains(&LifecycleEvent::RenderLoopFaulted {
            reason: "context lost".to_owned(),
        }));
        assert!(events.contains(&LifecycleEvent::StatusChanged {
            message: Some("Rendering stopped: context lost".to_owned()),
        }));
        assert_eq!(context.frames_rendered(), 0);
    }

    #[tokio::test]
    async fn engine_failure_is_reported_and_retried_on_next_call() {
        let engine = Arc::new(MockEngine::default());
        engine.fail_create.store(true, Ordering::Relaxed);
        let scene = bootstrapper(engine.clone(), Arc::new(LifecycleEventBus::default()));

        let error = scene.ensure_ready().await.expect_err("engine refuses");
        assert_eq!(
            error,
            LaunchError::ScenePreparationFailed(
                "Unable to prepare the VR scene: no GL context".to_owned()
            )
        );
        assert!(scene.context().is_none());
        assert_eq!(scene.render_loops_started(), 0);

        engine.fail_create.store(false, Ordering::Relaxed);
        scene.ensure_ready().await.expect("second attempt succeeds");
        assert_eq!(scene.render_loops_started(), 1);
    }

    #[tokio::test]
    async fn bind_session_requires_a_prepared_scene() {
        let engine = Arc::new(MockEngine::default());
        let scene = bootstrapper(engine.clone(), Arc::new(LifecycleEventBus::default()));
        let handle = ImmersiveSessionHandle {
            session_id: ImmersiveSessionId::new("xr-1"),
            mode: SessionMode::ImmersiveVr,
        };

        assert!(matches!(
            scene.bind_session(&handle),
            Err(PlatformError::Internal(_))
        ));

        scene.ensure_ready().await.expect("init");
        scene.bind_session(&handle).expect("bind");
        assert_eq!(
            engine.bound.lock().expect("bound lock").clone(),
            vec![ImmersiveSessionId::new("xr-1")]
        );
    }
}
