use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::info;

use deepguard_core::detector::Detector;
use deepguard_core::events::{DiscoveryEvent, ScanEvent};
use deepguard_core::ids::ElementId;
use deepguard_core::result::DetectionResult;
use deepguard_core::settings::SettingsStore;
use deepguard_core::stats::{Stats, StatsSink};
use deepguard_core::surface::MediaSurface;

use crate::capture::FrameCapture;
use crate::controller::ScanStatus;
use crate::discovery::DiscoveryEngine;
use crate::error::EngineError;
use crate::registry::ControllerRegistry;
use crate::render::{RenderSurface, ResultRenderer};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Shared engine state handed to controllers and discovery.
pub(crate) struct EngineCtx {
    pub(crate) registry: ControllerRegistry,
    pub(crate) renderer: ResultRenderer,
    pub(crate) capture: FrameCapture,
    pub(crate) detector: Arc<dyn Detector>,
    pub(crate) surface: Arc<dyn MediaSurface>,
    pub(crate) settings: SettingsStore,
    pub(crate) stats: Arc<dyn StatsSink>,
    event_tx: broadcast::Sender<ScanEvent>,
}

impl EngineCtx {
    /// Observers are optional; an absent or lagging receiver never affects
    /// scanning.
    pub(crate) fn send_event(&self, event: ScanEvent) {
        let _ = self.event_tx.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.event_tx.subscribe()
    }
}

/// The media-scanning orchestration engine.
///
/// Wires discovery, the controller registry, frame capture, the detection
/// backend, and the result renderer together behind one facade. All entry
/// points must be called from within a tokio runtime; controllers execute
/// on its scheduler, interleaved but never overlapping per element.
pub struct ScanEngine {
    ctx: Arc<EngineCtx>,
    discovery: DiscoveryEngine,
}

impl ScanEngine {
    pub fn new(
        detector: Arc<dyn Detector>,
        media_surface: Arc<dyn MediaSurface>,
        render_surface: Arc<dyn RenderSurface>,
        settings: SettingsStore,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let ctx = Arc::new(EngineCtx {
            registry: ControllerRegistry::new(),
            renderer: ResultRenderer::new(render_surface, settings.clone()),
            capture: FrameCapture::new(Arc::clone(&media_surface)),
            detector,
            surface: media_surface,
            settings,
            stats,
            event_tx,
        });
        let discovery = DiscoveryEngine::new(Arc::clone(&ctx));
        Self { ctx, discovery }
    }

    /// Feed one discovery observation into the engine.
    pub fn handle_event(&self, event: DiscoveryEvent) {
        self.discovery.handle(event);
    }

    /// Drain a discovery event channel until every sender is dropped.
    pub async fn run(&self, mut rx: mpsc::Receiver<DiscoveryEvent>) {
        info!("scan engine running");
        while let Some(event) = rx.recv().await {
            self.discovery.handle(event);
        }
        info!("discovery event stream closed");
    }

    /// Manual single scan for a registered element.
    pub fn scan_now(&self, id: &ElementId) -> Result<(), EngineError> {
        let controller = self
            .ctx
            .registry
            .get(id)
            .ok_or_else(|| EngineError::ElementNotFound(id.clone()))?;
        controller.scan_now(&self.ctx);
        Ok(())
    }

    pub fn pause(&self, id: &ElementId) -> Result<(), EngineError> {
        let controller = self
            .ctx
            .registry
            .get(id)
            .ok_or_else(|| EngineError::ElementNotFound(id.clone()))?;
        controller.pause(&self.ctx);
        Ok(())
    }

    pub fn resume(&self, id: &ElementId) -> Result<(), EngineError> {
        let controller = self
            .ctx
            .registry
            .get(id)
            .ok_or_else(|| EngineError::ElementNotFound(id.clone()))?;
        controller.resume(&self.ctx);
        Ok(())
    }

    pub fn stop(&self, id: &ElementId) -> Result<(), EngineError> {
        let controller = self
            .ctx
            .registry
            .get(id)
            .ok_or_else(|| EngineError::ElementNotFound(id.clone()))?;
        controller.stop(&self.ctx);
        Ok(())
    }

    /// Stop every live controller; returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let ids = self.ctx.registry.ids();
        let mut stopped = 0;
        for id in ids {
            if let Some(controller) = self.ctx.registry.get(&id) {
                controller.stop(&self.ctx);
                stopped += 1;
            }
        }
        stopped
    }

    pub fn status(&self, id: &ElementId) -> Option<ScanStatus> {
        self.ctx.registry.get(id).map(|c| c.status())
    }

    pub fn last_result(&self, id: &ElementId) -> Option<DetectionResult> {
        self.ctx.registry.get(id).and_then(|c| c.last_result())
    }

    pub fn controller_count(&self) -> usize {
        self.ctx.registry.count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.ctx.subscribe()
    }

    pub fn settings(&self) -> SettingsStore {
        self.ctx.settings.clone()
    }

    pub fn stats(&self) -> Stats {
        self.ctx.stats.snapshot()
    }

    #[cfg(test)]
    pub(crate) fn ctx(&self) -> &Arc<EngineCtx> {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use deepguard_core::errors::ScanError;
    use deepguard_core::media::PlaybackState;
    use deepguard_core::result::Prediction;
    use deepguard_core::settings::Settings;
    use deepguard_core::stats::MemoryStats;
    use deepguard_detect::mock::{MockDetector, MockOutcome};

    use crate::controller::SCAN_INTERVAL;
    use crate::render::RenderOp;
    use crate::testing::{
        image_descriptor, playing, raw_frame, video_descriptor, FakeMediaSurface,
        RecordingSurface,
    };

    struct Harness {
        engine: ScanEngine,
        detector: Arc<MockDetector>,
        media: Arc<FakeMediaSurface>,
        render: Arc<RecordingSurface>,
        stats: Arc<MemoryStats>,
        settings: SettingsStore,
    }

    fn harness_with(outcomes: Vec<MockOutcome>, settings: Settings) -> Harness {
        let detector = Arc::new(MockDetector::new(outcomes));
        let media = Arc::new(FakeMediaSurface::default());
        let render = Arc::new(RecordingSurface::default());
        let stats = Arc::new(MemoryStats::new());
        let settings = SettingsStore::new(settings);
        let engine = ScanEngine::new(
            Arc::clone(&detector) as Arc<dyn Detector>,
            Arc::clone(&media) as Arc<dyn MediaSurface>,
            Arc::clone(&render) as Arc<dyn RenderSurface>,
            settings.clone(),
            Arc::clone(&stats) as Arc<dyn StatsSink>,
        );
        Harness {
            engine,
            detector,
            media,
            render,
            stats,
            settings,
        }
    }

    fn harness(outcomes: Vec<MockOutcome>) -> Harness {
        harness_with(outcomes, Settings::default())
    }

    /// Let spawned scan tasks run to completion.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    /// Register a playing video with grabbable pixels and hand it to the
    /// engine.
    fn seen_video(h: &Harness) -> ElementId {
        let id = ElementId::new();
        h.media.set_playback(&id, playing());
        h.media.set_video_frame(&id, raw_frame(8, 8));
        h.engine.handle_event(DiscoveryEvent::VideoSeen {
            desc: video_descriptor(&id),
            playback: playing(),
        });
        id
    }

    /// Register an image with grabbable pixels (network path unused).
    fn seen_image(h: &Harness) -> ElementId {
        let id = ElementId::new();
        h.media.set_image_pixels(&id, raw_frame(8, 8));
        h.engine.handle_event(DiscoveryEvent::ImageSeen {
            desc: image_descriptor(&id),
        });
        id
    }

    fn fake_outcome() -> MockOutcome {
        MockOutcome::Result(
            DetectionResult::new(Prediction::Fake, 93.0)
                .with_frequency_score(0.41)
                .with_processing_time(1.2),
        )
    }

    #[tokio::test]
    async fn image_discovery_is_idempotent() {
        let h = harness(vec![]);
        let id = ElementId::new();

        h.engine.handle_event(DiscoveryEvent::ImageSeen {
            desc: image_descriptor(&id),
        });
        h.engine.handle_event(DiscoveryEvent::ImageSeen {
            desc: image_descriptor(&id),
        });

        assert_eq!(
            h.render
                .count_ops(|op| matches!(op, RenderOp::MountScanButton { .. })),
            1
        );
        assert_eq!(h.engine.controller_count(), 1);
        assert_eq!(h.engine.status(&id), Some(ScanStatus::Idle));
    }

    #[tokio::test]
    async fn unqualified_image_is_ignored() {
        let h = harness(vec![]);
        let id = ElementId::new();
        let mut desc = image_descriptor(&id);
        desc.width = 50;
        desc.height = 50;

        h.engine.handle_event(DiscoveryEvent::ImageSeen { desc });

        assert_eq!(h.engine.controller_count(), 0);
        assert_eq!(
            h.render
                .count_ops(|op| matches!(op, RenderOp::MountScanButton { .. })),
            0
        );
    }

    #[tokio::test]
    async fn video_autoscan_scans_immediately() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome()]);
        let id = seen_video(&h);
        settle().await;

        assert_eq!(h.detector.call_count(), 1);
        assert_eq!(h.engine.status(&id), Some(ScanStatus::Scanning));
        assert_eq!(
            h.render.count_ops(|op| matches!(op, RenderOp::ShowBadge { .. })),
            1
        );
        let stats = h.stats.snapshot();
        assert_eq!(stats.videos_scanned, 1);
        assert_eq!(stats.deepfakes_found, 1);
        assert!(h
            .engine
            .last_result(&id)
            .is_some_and(|r| r.prediction.is_fake()));
    }

    #[tokio::test]
    async fn video_with_autoscan_off_is_consumed_unscanned() {
        let h = harness_with(
            vec![],
            Settings {
                auto_scan: false,
                ..Settings::default()
            },
        );
        let id = seen_video(&h);
        settle().await;

        assert_eq!(h.engine.controller_count(), 0);
        assert_eq!(h.detector.call_count(), 0);

        // flipping the setting later does not resurrect a consumed element
        h.settings.replace(Settings::default());
        h.engine.handle_event(DiscoveryEvent::VideoSeen {
            desc: video_descriptor(&id),
            playback: playing(),
        });
        assert_eq!(h.engine.controller_count(), 0);
    }

    #[tokio::test]
    async fn disabled_platform_is_retried_after_enable() {
        let h = harness_with(
            vec![fake_outcome()],
            Settings {
                enable_instagram: false,
                ..Settings::default()
            },
        );
        let id = ElementId::new();
        h.media.set_playback(&id, playing());
        h.media.set_video_frame(&id, raw_frame(8, 8));
        let mut desc = video_descriptor(&id);
        desc.platform = "Instagram".into();

        h.engine.handle_event(DiscoveryEvent::VideoSeen {
            desc: desc.clone(),
            playback: playing(),
        });
        assert_eq!(h.engine.controller_count(), 0);

        // a disabled platform does not consume the element
        h.settings.replace(Settings::default());
        h.engine.handle_event(DiscoveryEvent::VideoSeen {
            desc,
            playback: playing(),
        });
        assert_eq!(h.engine.controller_count(), 1);
    }

    #[tokio::test]
    async fn ticks_scan_on_the_interval() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome(), fake_outcome(), fake_outcome()]);
        seen_video(&h);
        settle().await;
        assert_eq!(h.detector.call_count(), 1);

        tokio::time::sleep(SCAN_INTERVAL).await;
        settle().await;
        assert_eq!(h.detector.call_count(), 2);

        tokio::time::sleep(SCAN_INTERVAL).await;
        settle().await;
        assert_eq!(h.detector.call_count(), 3);
    }

    #[tokio::test]
    async fn tick_skipped_while_video_not_playing() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome(), fake_outcome()]);
        let id = seen_video(&h);
        settle().await;
        assert_eq!(h.detector.call_count(), 1);

        // the user pauses playback; scanning stays on but ticks no-op
        h.media.set_playback(
            &id,
            PlaybackState {
                paused: true,
                ..playing()
            },
        );
        tokio::time::sleep(SCAN_INTERVAL * 2).await;
        settle().await;
        assert_eq!(h.detector.call_count(), 1);
        assert_eq!(h.engine.status(&id), Some(ScanStatus::Scanning));

        h.media.set_playback(&id, playing());
        tokio::time::sleep(SCAN_INTERVAL).await;
        settle().await;
        assert_eq!(h.detector.call_count(), 2);
    }

    #[tokio::test]
    async fn pause_and_resume_semantics() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome(), fake_outcome(), fake_outcome()]);
        let id = seen_video(&h);
        settle().await;
        assert_eq!(h.detector.call_count(), 1);

        h.engine.pause(&id).unwrap();
        assert_eq!(h.engine.status(&id), Some(ScanStatus::Paused));

        // ticks elapsed while paused produce zero requests
        tokio::time::sleep(SCAN_INTERVAL * 3).await;
        settle().await;
        assert_eq!(h.detector.call_count(), 1);

        // resuming triggers exactly one immediate scan
        h.engine.resume(&id).unwrap();
        settle().await;
        assert_eq!(h.detector.call_count(), 2);
        assert_eq!(h.engine.status(&id), Some(ScanStatus::Scanning));

        // and tick-driven scans continue
        tokio::time::sleep(SCAN_INTERVAL).await;
        settle().await;
        assert_eq!(h.detector.call_count(), 3);
    }

    #[tokio::test]
    async fn in_flight_guard_drops_concurrent_triggers() {
        tokio::time::pause();
        let h = harness(vec![
            MockOutcome::delayed(Duration::from_secs(10), fake_outcome()),
            fake_outcome(),
        ]);
        let mut events = h.engine.subscribe();
        let id = seen_video(&h);
        settle().await;
        assert_eq!(h.detector.call_count(), 1);

        // a manual trigger while the first request is outstanding is a no-op
        h.engine.scan_now(&id).unwrap();
        settle().await;
        assert_eq!(h.detector.call_count(), 1);

        let mut saw_skip = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ScanEvent::ScanSkipped { .. }) {
                saw_skip = true;
            }
        }
        assert!(saw_skip, "expected a scan_skipped event");

        // silence the interval ticks so only the outstanding request remains
        h.media.set_playback(
            &id,
            PlaybackState {
                paused: true,
                ..playing()
            },
        );

        // after completion the guard is clear and a new scan goes through
        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;
        let controller = h.engine.ctx().registry.get(&id).unwrap();
        assert!(!controller.in_flight());

        h.engine.scan_now(&id).unwrap();
        settle().await;
        assert_eq!(h.detector.call_count(), 2);
        assert!(!controller.in_flight());
    }

    #[tokio::test]
    async fn in_flight_clear_after_error_and_capture_failure() {
        tokio::time::pause();
        let h = harness(vec![MockOutcome::Error(ScanError::Remote("boom".into()))]);
        let id = seen_video(&h);
        settle().await;

        let controller = h.engine.ctx().registry.get(&id).unwrap();
        assert!(!controller.in_flight());

        // capture failure path: pixels vanish, scan aborts before a request
        h.media.clear_video_frame(&id);
        h.engine.scan_now(&id).unwrap();
        settle().await;
        assert!(!controller.in_flight());
    }

    #[tokio::test]
    async fn stop_tears_down_timer_and_artifacts() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome(), fake_outcome()]);
        let id = seen_video(&h);
        settle().await;
        assert_eq!(h.detector.call_count(), 1);

        h.engine.stop(&id).unwrap();
        settle().await;

        assert_eq!(h.engine.controller_count(), 0);
        assert_eq!(h.engine.status(&id), None);
        assert_eq!(h.render.live_badges(&id), 0);
        assert_eq!(
            h.render
                .count_ops(|op| matches!(op, RenderOp::RemoveControls { .. })),
            1
        );

        // the timer is gone: no further requests ever fire
        tokio::time::sleep(SCAN_INTERVAL * 5).await;
        settle().await;
        assert_eq!(h.detector.call_count(), 1);
    }

    #[tokio::test]
    async fn stale_result_after_stop_is_discarded() {
        tokio::time::pause();
        let h = harness(vec![MockOutcome::delayed(
            Duration::from_secs(5),
            fake_outcome(),
        )]);
        let id = seen_video(&h);
        settle().await; // request now in flight

        h.engine.stop(&id).unwrap();
        settle().await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;

        // the late completion must not render or count anything
        assert_eq!(
            h.render.count_ops(|op| matches!(op, RenderOp::ShowBadge { .. })),
            0
        );
        assert_eq!(h.stats.snapshot(), deepguard_core::stats::Stats::default());
    }

    #[tokio::test]
    async fn no_face_is_not_counted_in_stats() {
        tokio::time::pause();
        let h = harness(vec![MockOutcome::Error(ScanError::NoFaceDetected(
            "No face detected in image".into(),
        ))]);
        seen_video(&h);
        settle().await;

        assert_eq!(h.stats.snapshot(), deepguard_core::stats::Stats::default());
        assert_eq!(
            h.render.count_ops(|op| matches!(op, RenderOp::ShowBadge { .. })),
            1
        );
    }

    #[tokio::test]
    async fn network_error_retries_on_next_tick() {
        tokio::time::pause();
        let h = harness(vec![
            MockOutcome::Error(ScanError::NetworkUnreachable("refused".into())),
            MockOutcome::Result(DetectionResult::new(Prediction::Real, 75.0)),
        ]);
        let id = seen_video(&h);
        settle().await;
        assert_eq!(h.detector.call_count(), 1);
        assert_eq!(h.stats.snapshot().videos_scanned, 0);

        // the failure did not stop the timer
        tokio::time::sleep(SCAN_INTERVAL).await;
        settle().await;
        assert_eq!(h.detector.call_count(), 2);
        assert_eq!(h.stats.snapshot().videos_scanned, 1);
        assert_eq!(h.engine.status(&id), Some(ScanStatus::Scanning));
    }

    #[tokio::test]
    async fn video_capture_failure_is_silent() {
        tokio::time::pause();
        let h = harness(vec![]);
        let id = ElementId::new();
        h.media.set_playback(&id, playing());
        // no frame pixels configured: capture fails locally
        h.engine.handle_event(DiscoveryEvent::VideoSeen {
            desc: video_descriptor(&id),
            playback: playing(),
        });
        settle().await;

        assert_eq!(h.detector.call_count(), 0);
        assert_eq!(
            h.render.count_ops(|op| matches!(op, RenderOp::ShowBadge { .. })),
            0
        );
    }

    #[tokio::test]
    async fn image_manual_scan_renders_result() {
        tokio::time::pause();
        let h = harness(vec![MockOutcome::Result(DetectionResult::new(
            Prediction::Real,
            88.0,
        ))]);
        let id = seen_image(&h);
        settle().await;

        // images never auto-scan
        assert_eq!(h.detector.call_count(), 0);

        h.engine.scan_now(&id).unwrap();
        settle().await;

        assert_eq!(h.detector.call_count(), 1);
        assert_eq!(h.render.live_badges(&id), 1);
        assert_eq!(h.stats.snapshot().videos_scanned, 1);
        assert_eq!(h.engine.status(&id), Some(ScanStatus::Idle));
    }

    #[tokio::test]
    async fn inaccessible_image_renders_distinct_badge() {
        tokio::time::pause();
        let h = harness(vec![]);
        let id = ElementId::new();
        // no pixels and no source: both capture paths fail
        h.engine.handle_event(DiscoveryEvent::ImageSeen {
            desc: image_descriptor(&id),
        });
        h.engine.scan_now(&id).unwrap();
        settle().await;

        assert_eq!(h.detector.call_count(), 0);
        let shown = h.render.ops().iter().any(|op| {
            matches!(
                op,
                RenderOp::ShowBadge { badge } if matches!(
                    &badge.body,
                    crate::render::BadgeBody::Status { text, .. } if text == "Cannot access image"
                )
            )
        });
        assert!(shown, "expected the cannot-access badge");
        assert_eq!(h.stats.snapshot().videos_scanned, 0);
    }

    #[tokio::test]
    async fn playback_ended_discards_controller() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome()]);
        let id = seen_video(&h);
        settle().await;
        assert_eq!(h.engine.controller_count(), 1);

        h.engine
            .handle_event(DiscoveryEvent::PlaybackEnded { id: id.clone() });
        settle().await;

        assert_eq!(h.engine.controller_count(), 0);
        assert_eq!(h.render.live_badges(&id), 0);
    }

    #[tokio::test]
    async fn unknown_element_operations_fail() {
        let h = harness(vec![]);
        let id = ElementId::new();
        assert!(matches!(
            h.engine.scan_now(&id),
            Err(EngineError::ElementNotFound(_))
        ));
        assert!(h.engine.pause(&id).is_err());
        assert!(h.engine.resume(&id).is_err());
        assert!(h.engine.stop(&id).is_err());
    }

    #[tokio::test]
    async fn stop_all_stops_everything() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome(), fake_outcome()]);
        seen_video(&h);
        seen_video(&h);
        settle().await;
        assert_eq!(h.engine.controller_count(), 2);

        assert_eq!(h.engine.stop_all(), 2);
        assert_eq!(h.engine.controller_count(), 0);
    }

    #[tokio::test]
    async fn lifecycle_events_are_broadcast() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome()]);
        let mut rx = h.engine.subscribe();
        let id = seen_video(&h);
        settle().await;
        h.engine.stop(&id).unwrap();
        settle().await;

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(
            types,
            vec![
                "controller_started",
                "scan_started",
                "scan_completed",
                "controller_stopped"
            ]
        );
    }

    #[tokio::test]
    async fn settings_change_applies_to_next_scan() {
        tokio::time::pause();
        let h = harness(vec![fake_outcome(), fake_outcome()]);
        let id = seen_video(&h);
        settle().await;
        assert_eq!(
            h.render
                .count_ops(|op| matches!(op, RenderOp::ShowNotification { .. })),
            1
        );

        h.settings.replace(Settings {
            show_warnings: false,
            ..Settings::default()
        });

        h.engine.scan_now(&id).unwrap();
        settle().await;
        assert_eq!(h.detector.call_count(), 2);
        // the second FAKE result raises no notification
        assert_eq!(
            h.render
                .count_ops(|op| matches!(op, RenderOp::ShowNotification { .. })),
            1
        );
    }
}
