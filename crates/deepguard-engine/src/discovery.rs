use std::sync::Arc;

use tracing::{debug, trace};

use deepguard_core::events::DiscoveryEvent;
use deepguard_core::ids::ElementId;
use deepguard_core::media::{MediaDescriptor, PlaybackState, Rect, Viewport};
use deepguard_core::settings::Settings;

use crate::controller::ScanController;
use crate::engine::EngineCtx;

/// Minimum rendered size for a scannable image; anything smaller is UI
/// chrome (icons, buttons).
pub const MIN_IMAGE_WIDTH: u32 = 200;
pub const MIN_IMAGE_HEIGHT: u32 = 200;

/// Accepted aspect-ratio band; banners and slivers fall outside it.
pub const MIN_ASPECT_RATIO: f64 = 0.2;
pub const MAX_ASPECT_RATIO: f64 = 5.0;

/// The viewport is extended this many pixels above and below when deciding
/// whether an element is close enough to be worth processing.
pub const VIEWPORT_MARGIN_PX: f64 = 500.0;

/// Why an observed element was not registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disqualification {
    AlreadyProcessed,
    InsideOverlay,
    PlatformDisabled,
    TooSmall,
    ExtremeAspectRatio,
    OutsideViewport,
    NotPlaying,
}

/// Whether a rect is within the viewport expanded by the discovery margin.
pub fn near_viewport(rect: &Rect, viewport: &Viewport) -> bool {
    rect.top < viewport.height + VIEWPORT_MARGIN_PX && rect.bottom > -VIEWPORT_MARGIN_PX
}

/// Qualification filter for images. Pure: testable without a page.
pub fn qualify_image(
    desc: &MediaDescriptor,
    processed: bool,
    settings: &Settings,
) -> Result<(), Disqualification> {
    if processed {
        return Err(Disqualification::AlreadyProcessed);
    }
    if desc.inside_overlay {
        return Err(Disqualification::InsideOverlay);
    }
    if !settings.platform_enabled(&desc.platform) {
        return Err(Disqualification::PlatformDisabled);
    }
    if desc.width < MIN_IMAGE_WIDTH || desc.height < MIN_IMAGE_HEIGHT {
        return Err(Disqualification::TooSmall);
    }
    let aspect = desc.aspect_ratio();
    if !(MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&aspect) {
        return Err(Disqualification::ExtremeAspectRatio);
    }
    if !near_viewport(&desc.rect, &desc.viewport) {
        return Err(Disqualification::OutsideViewport);
    }
    Ok(())
}

/// Qualification filter for videos: must be actively playing when observed.
pub fn qualify_video(
    desc: &MediaDescriptor,
    playback: &PlaybackState,
    processed: bool,
    settings: &Settings,
) -> Result<(), Disqualification> {
    if processed {
        return Err(Disqualification::AlreadyProcessed);
    }
    if !settings.platform_enabled(&desc.platform) {
        return Err(Disqualification::PlatformDisabled);
    }
    if !playback.is_playing() {
        return Err(Disqualification::NotPlaying);
    }
    Ok(())
}

/// Consumes discovery events and turns qualifying elements into registered
/// controllers. Sources re-emit elements freely; the processed flag makes
/// registration idempotent.
pub(crate) struct DiscoveryEngine {
    ctx: Arc<EngineCtx>,
}

impl DiscoveryEngine {
    pub(crate) fn new(ctx: Arc<EngineCtx>) -> Self {
        Self { ctx }
    }

    pub(crate) fn handle(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::ImageSeen { desc } => self.on_image(desc),
            DiscoveryEvent::VideoSeen { desc, playback } => self.on_video(desc, playback),
            DiscoveryEvent::PlaybackEnded { id } => self.on_playback_ended(&id),
        }
    }

    fn on_image(&self, desc: MediaDescriptor) {
        let settings = self.ctx.settings.snapshot();
        let processed = self.ctx.registry.is_processed(&desc.id);
        if let Err(reason) = qualify_image(&desc, processed, &settings) {
            trace!(element_id = %desc.id, ?reason, "image not qualified");
            return;
        }

        // Marking happens before registration, so overlapping observation
        // passes register at most once.
        if !self.ctx.registry.mark_processed(&desc.id) {
            return;
        }

        let controller = ScanController::new(desc.clone());
        self.ctx.registry.insert(controller);
        self.ctx.renderer.mount_scan_button(&desc);
        debug!(element_id = %desc.id, platform = %desc.platform, "scan affordance attached");
    }

    fn on_video(&self, desc: MediaDescriptor, playback: PlaybackState) {
        let settings = self.ctx.settings.snapshot();
        let processed = self.ctx.registry.is_processed(&desc.id);
        if let Err(reason) = qualify_video(&desc, &playback, processed, &settings) {
            trace!(element_id = %desc.id, ?reason, "video not qualified");
            return;
        }

        if !self.ctx.registry.mark_processed(&desc.id) {
            return;
        }

        // A video first seen with auto-scan off is consumed and never
        // scanned; flipping the setting affects only later discoveries.
        if !settings.auto_scan {
            debug!(element_id = %desc.id, "auto-scan disabled, video consumed without scanning");
            return;
        }

        let controller = ScanController::new(desc.clone());
        self.ctx.registry.insert(Arc::clone(&controller));
        self.ctx.renderer.mount_controls(&desc);
        controller.start(&self.ctx);
        debug!(element_id = %desc.id, platform = %desc.platform, "continuous scan started");
    }

    fn on_playback_ended(&self, id: &ElementId) {
        if let Some(controller) = self.ctx.registry.get(id) {
            controller.stop(&self.ctx);
        }
    }
}
