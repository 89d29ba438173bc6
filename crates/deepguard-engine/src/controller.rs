use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use deepguard_core::errors::ScanError;
use deepguard_core::events::{ScanEvent, SkipReason};
use deepguard_core::frame::Frame;
use deepguard_core::ids::{ElementId, ScanId};
use deepguard_core::media::{MediaDescriptor, MediaKind};
use deepguard_core::result::DetectionResult;

use crate::engine::EngineCtx;

/// Continuous scanning cadence for videos.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(3);

/// Controller lifecycle. Error display is transient render state, not a
/// controller state; every failure resolves back to the current status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Idle,
    Scanning,
    Paused,
    Stopped,
}

/// Per-element scan state machine. One controller exists per registered
/// media element; the registry owns its lifetime.
pub struct ScanController {
    desc: MediaDescriptor,
    status: Mutex<ScanStatus>,
    in_flight: AtomicBool,
    cancel: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
    last_result: Mutex<Option<DetectionResult>>,
}

/// Clears the in-flight flag on every exit path, including unwinds.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ScanController {
    pub fn new(desc: MediaDescriptor) -> Arc<Self> {
        Arc::new(Self {
            desc,
            status: Mutex::new(ScanStatus::Idle),
            in_flight: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            timer: Mutex::new(None),
            last_result: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &ElementId {
        &self.desc.id
    }

    pub fn kind(&self) -> MediaKind {
        self.desc.kind
    }

    pub fn descriptor(&self) -> &MediaDescriptor {
        &self.desc
    }

    pub fn status(&self) -> ScanStatus {
        *self.status.lock()
    }

    pub fn last_result(&self) -> Option<DetectionResult> {
        self.last_result.lock().clone()
    }

    /// Begin continuous scanning: one immediate attempt plus a repeating
    /// timer. Only valid from `Idle`.
    pub fn start(self: Arc<Self>, ctx: &Arc<EngineCtx>) {
        {
            let mut status = self.status.lock();
            if *status != ScanStatus::Idle {
                warn!(element_id = %self.desc.id, status = ?*status, "start ignored");
                return;
            }
            *status = ScanStatus::Scanning;
        }

        ctx.send_event(ScanEvent::ControllerStarted {
            element_id: self.desc.id.clone(),
            kind: self.desc.kind,
        });

        let timer = {
            let ctrl = Arc::clone(&self);
            let ctx = Arc::clone(ctx);
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SCAN_INTERVAL);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // the first tick completes immediately; the initial scan is
                // dispatched separately below
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => ctrl.on_tick(&ctx).await,
                    }
                }
            })
        };
        *self.timer.lock() = Some(timer);

        self.spawn_scan(ctx);
    }

    /// Stop issuing requests while keeping the timer ticking; each tick is
    /// a no-op until resumed. The timer itself is not torn down.
    pub fn pause(&self, ctx: &Arc<EngineCtx>) {
        {
            let mut status = self.status.lock();
            if *status != ScanStatus::Scanning {
                debug!(element_id = %self.desc.id, status = ?*status, "pause ignored");
                return;
            }
            *status = ScanStatus::Paused;
        }
        ctx.renderer.set_controls_paused(&self.desc.id, true);
        ctx.send_event(ScanEvent::ScanningPaused {
            element_id: self.desc.id.clone(),
        });
    }

    /// Resume tick-driven scanning and trigger one immediate attempt.
    pub fn resume(self: Arc<Self>, ctx: &Arc<EngineCtx>) {
        {
            let mut status = self.status.lock();
            if *status != ScanStatus::Paused {
                debug!(element_id = %self.desc.id, status = ?*status, "resume ignored");
                return;
            }
            *status = ScanStatus::Scanning;
        }
        ctx.renderer.set_controls_paused(&self.desc.id, false);
        ctx.send_event(ScanEvent::ScanningResumed {
            element_id: self.desc.id.clone(),
        });
        self.spawn_scan(ctx);
    }

    /// Manual single scan: the image affordance click and the video
    /// "scan now" control.
    pub fn scan_now(self: Arc<Self>, ctx: &Arc<EngineCtx>) {
        if self.status() == ScanStatus::Stopped {
            warn!(element_id = %self.desc.id, "scan_now on stopped controller ignored");
            return;
        }
        self.spawn_scan(ctx);
    }

    /// Terminal teardown: the timer cannot fire again, all visual
    /// artifacts are removed, and the controller leaves the registry.
    pub fn stop(&self, ctx: &Arc<EngineCtx>) {
        {
            let mut status = self.status.lock();
            if *status == ScanStatus::Stopped {
                return;
            }
            *status = ScanStatus::Stopped;
        }

        self.cancel.cancel();
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }

        ctx.renderer.clear_element(&self.desc);
        ctx.registry.remove(&self.desc.id);
        ctx.send_event(ScanEvent::ControllerStopped {
            element_id: self.desc.id.clone(),
        });
        debug!(element_id = %self.desc.id, "controller stopped");
    }

    fn spawn_scan(self: Arc<Self>, ctx: &Arc<EngineCtx>) {
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            self.scan_once(&ctx).await;
        });
    }

    async fn on_tick(&self, ctx: &Arc<EngineCtx>) {
        if self.status() != ScanStatus::Scanning {
            return;
        }

        // The user pausing playback is distinct from scan-pausing: a tick
        // that finds the element not actually playing is skipped outright.
        let playing = ctx
            .surface
            .playback(&self.desc.id)
            .map(|p| p.is_playing())
            .unwrap_or(false);
        if !playing {
            trace!(element_id = %self.desc.id, "tick skipped, element not playing");
            return;
        }

        self.scan_once(ctx).await;
    }

    /// One scan attempt: capture, detect, render. Every failure class is
    /// contained here; nothing that happens in this function stops the
    /// timer or unwinds into the host.
    #[instrument(skip(self, ctx), fields(element_id = %self.desc.id, kind = self.desc.kind.as_str()))]
    pub(crate) async fn scan_once(&self, ctx: &EngineCtx) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("scan already in flight, dropping trigger");
            ctx.send_event(ScanEvent::ScanSkipped {
                element_id: self.desc.id.clone(),
                reason: SkipReason::InFlight,
            });
            return;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let scan_id = ScanId::new();
        ctx.send_event(ScanEvent::ScanStarted {
            element_id: self.desc.id.clone(),
            scan_id: scan_id.clone(),
        });
        ctx.renderer.begin_scan(&self.desc);

        let frame = match self.capture_frame(ctx).await {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, "frame capture failed");
                ctx.send_event(ScanEvent::ScanFailed {
                    element_id: self.desc.id.clone(),
                    scan_id,
                    kind: err.kind().to_owned(),
                });
                match self.desc.kind {
                    // A video frame that cannot be grabbed is silently
                    // skipped; the next tick retries.
                    MediaKind::Video => ctx.renderer.end_scan(&self.desc),
                    MediaKind::Image => ctx.renderer.render_error(&self.desc, &err),
                }
                return;
            }
        };

        let outcome = ctx.detector.analyze(&frame).await;

        // The request may have resolved after the controller was stopped;
        // a stale completion must not touch render or stats state.
        if !ctx.registry.is_active(&self.desc.id) {
            debug!("controller gone, discarding scan outcome");
            return;
        }

        match outcome {
            Ok(result) => {
                ctx.stats.record(&result);
                *self.last_result.lock() = Some(result.clone());
                ctx.renderer.render_result(&self.desc, &result);
                ctx.send_event(ScanEvent::ScanCompleted {
                    element_id: self.desc.id.clone(),
                    scan_id,
                    result,
                });
            }
            Err(err) => {
                debug!(error = %err, kind = err.kind(), "scan failed");
                ctx.renderer.render_error(&self.desc, &err);
                ctx.send_event(ScanEvent::ScanFailed {
                    element_id: self.desc.id.clone(),
                    scan_id,
                    kind: err.kind().to_owned(),
                });
            }
        }
    }

    async fn capture_frame(&self, ctx: &EngineCtx) -> Result<Frame, ScanError> {
        match self.desc.kind {
            MediaKind::Video => ctx.capture.video_frame(&self.desc.id),
            MediaKind::Image => ctx.capture.image_frame(&self.desc).await,
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}
