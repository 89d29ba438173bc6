use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use deepguard_core::errors::ScanError;
use deepguard_core::ids::{BadgeId, ElementId};
use deepguard_core::media::{MediaDescriptor, MediaKind};
use deepguard_core::result::{DetectionResult, Prediction};
use deepguard_core::settings::SettingsStore;

/// The scanning overlay is decorative and removes itself quickly.
pub const SCANNING_OVERLAY_TTL: Duration = Duration::from_secs(2);

/// How long the image affordance shows its error state before becoming
/// clickable again.
pub const BUTTON_RESET_DELAY: Duration = Duration::from_secs(3);

pub const INFO_BADGE_TTL: Duration = Duration::from_secs(3);
pub const IMAGE_ERROR_BADGE_TTL: Duration = Duration::from_secs(4);
pub const VIDEO_ERROR_BADGE_TTL: Duration = Duration::from_secs(5);
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(8);

const ERROR_TEXT_LIMIT: usize = 30;

/// Binary rendering of a prediction; anything not positively fake renders
/// as REAL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Fake,
    Real,
}

impl From<Prediction> for Verdict {
    fn from(prediction: Prediction) -> Self {
        if prediction.is_fake() {
            Self::Fake
        } else {
            Self::Real
        }
    }
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fake => "FAKE",
            Self::Real => "REAL",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetailRow {
    pub label: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BadgeBody {
    /// A detection verdict with its detail panel.
    Result {
        verdict: Verdict,
        details: Vec<DetailRow>,
    },
    /// A transient status message (errors, "no face detected").
    Status { severity: Severity, text: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Badge {
    pub id: BadgeId,
    pub element_id: ElementId,
    pub body: BadgeBody,
}

/// State of the clickable image scan affordance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonState {
    Ready,
    Scanning,
    Error,
}

/// Instructions for the host's rendering layer, anchored to an element's
/// container. Removal ops are idempotent: removing something already gone
/// is a no-op for the host.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenderOp {
    MountScanButton { element_id: ElementId },
    SetButtonState { element_id: ElementId, state: ButtonState },
    RemoveScanButton { element_id: ElementId },
    MountControls { element_id: ElementId },
    SetControlsPaused { element_id: ElementId, paused: bool },
    RemoveControls { element_id: ElementId },
    ShowScanningOverlay { element_id: ElementId },
    RemoveScanningOverlay { element_id: ElementId },
    ShowBadge { badge: Badge },
    RemoveBadge { element_id: ElementId, badge_id: BadgeId },
    ClearBadges { element_id: ElementId },
    ShowNotification { id: BadgeId, element_id: ElementId, text: String },
    RemoveNotification { id: BadgeId, element_id: ElementId },
}

impl RenderOp {
    pub fn element_id(&self) -> &ElementId {
        match self {
            Self::MountScanButton { element_id }
            | Self::SetButtonState { element_id, .. }
            | Self::RemoveScanButton { element_id }
            | Self::MountControls { element_id }
            | Self::SetControlsPaused { element_id, .. }
            | Self::RemoveControls { element_id }
            | Self::ShowScanningOverlay { element_id }
            | Self::RemoveScanningOverlay { element_id }
            | Self::RemoveBadge { element_id, .. }
            | Self::ClearBadges { element_id }
            | Self::ShowNotification { element_id, .. }
            | Self::RemoveNotification { element_id, .. } => element_id,
            Self::ShowBadge { badge } => &badge.element_id,
        }
    }
}

/// Host-side application of render ops to the page.
pub trait RenderSurface: Send + Sync {
    fn apply(&self, op: RenderOp);
}

struct RendererInner {
    surface: Arc<dyn RenderSurface>,
    settings: SettingsStore,
    result_badges: DashMap<ElementId, BadgeId>,
    status_badges: DashMap<ElementId, BadgeId>,
    buttons: DashMap<ElementId, ButtonState>,
}

impl RendererInner {
    fn apply(&self, op: RenderOp) {
        self.surface.apply(op);
    }
}

/// Projects detection results and error conditions into visual state.
///
/// The renderer owns badge de-duplication: at most one result badge and
/// one status badge exist per element container at any time. Auto-dismiss
/// timers target specific badge ids, so a replacement badge is never torn
/// down by a stale timer.
#[derive(Clone)]
pub struct ResultRenderer {
    inner: Arc<RendererInner>,
}

impl ResultRenderer {
    pub fn new(surface: Arc<dyn RenderSurface>, settings: SettingsStore) -> Self {
        Self {
            inner: Arc::new(RendererInner {
                surface,
                settings,
                result_badges: DashMap::new(),
                status_badges: DashMap::new(),
                buttons: DashMap::new(),
            }),
        }
    }

    /// Attach the clickable scan affordance to an image container,
    /// clearing any badges left over from a previous life of the
    /// container.
    pub fn mount_scan_button(&self, desc: &MediaDescriptor) {
        self.inner.result_badges.remove(&desc.id);
        self.inner.status_badges.remove(&desc.id);
        self.inner.apply(RenderOp::ClearBadges {
            element_id: desc.id.clone(),
        });
        self.inner.buttons.insert(desc.id.clone(), ButtonState::Ready);
        self.inner.apply(RenderOp::MountScanButton {
            element_id: desc.id.clone(),
        });
    }

    /// Attach the pause/resume/scan-now/stop control strip to a video.
    pub fn mount_controls(&self, desc: &MediaDescriptor) {
        self.inner.apply(RenderOp::MountControls {
            element_id: desc.id.clone(),
        });
    }

    pub fn set_controls_paused(&self, id: &ElementId, paused: bool) {
        self.inner.apply(RenderOp::SetControlsPaused {
            element_id: id.clone(),
            paused,
        });
    }

    /// Visual state for an in-progress scan: the overlay, and for images
    /// the affordance flips to its scanning state.
    pub fn begin_scan(&self, desc: &MediaDescriptor) {
        if desc.kind == MediaKind::Image {
            self.set_button(&desc.id, ButtonState::Scanning);
        }
        self.inner.apply(RenderOp::ShowScanningOverlay {
            element_id: desc.id.clone(),
        });

        let inner = Arc::clone(&self.inner);
        let element_id = desc.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SCANNING_OVERLAY_TTL).await;
            inner.apply(RenderOp::RemoveScanningOverlay { element_id });
        });
    }

    /// Clear in-progress visuals without rendering a badge (the silent
    /// video capture-failure path).
    pub fn end_scan(&self, desc: &MediaDescriptor) {
        self.inner.apply(RenderOp::RemoveScanningOverlay {
            element_id: desc.id.clone(),
        });
        if desc.kind == MediaKind::Image {
            self.set_button(&desc.id, ButtonState::Ready);
        }
    }

    /// Render a detection result: exactly one result badge per container,
    /// and the affordance returns to a re-scannable state.
    pub fn render_result(&self, desc: &MediaDescriptor, result: &DetectionResult) {
        self.end_scan(desc);

        // strict de-dup: the previous badge goes before the new one shows
        if let Some((_, old)) = self.inner.result_badges.remove(&desc.id) {
            self.inner.apply(RenderOp::RemoveBadge {
                element_id: desc.id.clone(),
                badge_id: old,
            });
        }

        let badge = result_badge(desc, result);
        self.inner
            .result_badges
            .insert(desc.id.clone(), badge.id.clone());
        self.inner.apply(RenderOp::ShowBadge { badge });

        if result.prediction.is_fake() && self.inner.settings.snapshot().show_warnings {
            self.show_warning_notification(desc, result);
        }

        debug!(
            element_id = %desc.id,
            prediction = %result.prediction,
            confidence = result.confidence,
            "result rendered"
        );
    }

    /// Render an error condition as a transient status badge and reset the
    /// affordance so the user can retry.
    pub fn render_error(&self, desc: &MediaDescriptor, error: &ScanError) {
        self.inner.apply(RenderOp::RemoveScanningOverlay {
            element_id: desc.id.clone(),
        });

        if desc.kind == MediaKind::Image {
            self.set_button(&desc.id, ButtonState::Error);
            self.reset_button_later(desc.id.clone());
        }

        if let Some((_, old)) = self.inner.status_badges.remove(&desc.id) {
            self.inner.apply(RenderOp::RemoveBadge {
                element_id: desc.id.clone(),
                badge_id: old,
            });
        }

        let (severity, text) = error_rendering(error);
        let ttl = match severity {
            Severity::Info => INFO_BADGE_TTL,
            Severity::Error => match desc.kind {
                MediaKind::Image => IMAGE_ERROR_BADGE_TTL,
                MediaKind::Video => VIDEO_ERROR_BADGE_TTL,
            },
        };

        let badge = Badge {
            id: BadgeId::new(),
            element_id: desc.id.clone(),
            body: BadgeBody::Status { severity, text },
        };
        self.inner
            .status_badges
            .insert(desc.id.clone(), badge.id.clone());
        let badge_id = badge.id.clone();
        self.inner.apply(RenderOp::ShowBadge { badge });

        self.dismiss_status_badge_later(desc.id.clone(), badge_id, ttl);
    }

    /// Remove every artifact owned for an element: badges, overlay, and
    /// its affordance or control strip. Called on controller teardown.
    pub fn clear_element(&self, desc: &MediaDescriptor) {
        self.inner.result_badges.remove(&desc.id);
        self.inner.status_badges.remove(&desc.id);
        self.inner.apply(RenderOp::RemoveScanningOverlay {
            element_id: desc.id.clone(),
        });
        self.inner.apply(RenderOp::ClearBadges {
            element_id: desc.id.clone(),
        });
        match desc.kind {
            MediaKind::Video => self.inner.apply(RenderOp::RemoveControls {
                element_id: desc.id.clone(),
            }),
            MediaKind::Image => {
                self.inner.buttons.remove(&desc.id);
                self.inner.apply(RenderOp::RemoveScanButton {
                    element_id: desc.id.clone(),
                });
            }
        }
    }

    fn set_button(&self, id: &ElementId, state: ButtonState) {
        self.inner.buttons.insert(id.clone(), state);
        self.inner.apply(RenderOp::SetButtonState {
            element_id: id.clone(),
            state,
        });
    }

    fn reset_button_later(&self, id: ElementId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(BUTTON_RESET_DELAY).await;
            // a rescan may have started meanwhile; only the error state resets
            let still_error = inner
                .buttons
                .get(&id)
                .map(|state| *state == ButtonState::Error)
                .unwrap_or(false);
            if still_error {
                inner.buttons.insert(id.clone(), ButtonState::Ready);
                inner.apply(RenderOp::SetButtonState {
                    element_id: id,
                    state: ButtonState::Ready,
                });
            }
        });
    }

    fn dismiss_status_badge_later(&self, element_id: ElementId, badge_id: BadgeId, ttl: Duration) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let still_current = inner
                .status_badges
                .get(&element_id)
                .map(|current| *current == badge_id)
                .unwrap_or(false);
            if still_current {
                inner.status_badges.remove(&element_id);
                inner.apply(RenderOp::RemoveBadge {
                    element_id,
                    badge_id,
                });
            }
        });
    }

    fn show_warning_notification(&self, desc: &MediaDescriptor, result: &DetectionResult) {
        let id = BadgeId::new();
        let text = format!(
            "This {} {} contains manipulated content ({} confidence)",
            desc.platform,
            desc.kind.as_str(),
            format_percent(result.confidence)
        );
        self.inner.apply(RenderOp::ShowNotification {
            id: id.clone(),
            element_id: desc.id.clone(),
            text,
        });

        let inner = Arc::clone(&self.inner);
        let element_id = desc.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(NOTIFICATION_TTL).await;
            inner.apply(RenderOp::RemoveNotification { id, element_id });
        });
    }
}

pub(crate) fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

fn result_badge(desc: &MediaDescriptor, result: &DetectionResult) -> Badge {
    let mut details = vec![DetailRow {
        label: "Confidence",
        value: format_percent(result.confidence),
    }];
    if let Some(score) = result.frequency_score {
        details.push(DetailRow {
            label: "Frequency",
            value: format_percent(score * 100.0),
        });
    }
    if let Some(seconds) = result.processing_time {
        details.push(DetailRow {
            label: "Scan Time",
            value: format!("{seconds:.2}s"),
        });
    }
    details.push(DetailRow {
        label: "Time",
        value: Local::now().format("%H:%M:%S").to_string(),
    });

    Badge {
        id: BadgeId::new(),
        element_id: desc.id.clone(),
        body: BadgeBody::Result {
            verdict: result.prediction.into(),
            details,
        },
    }
}

fn error_rendering(error: &ScanError) -> (Severity, String) {
    match error {
        ScanError::NoFaceDetected(_) => (Severity::Info, "No face detected".into()),
        ScanError::ImageInaccessible(_) => (Severity::Error, "Cannot access image".into()),
        ScanError::NetworkUnreachable(_) => {
            (Severity::Error, "API Offline - Check connection".into())
        }
        ScanError::CaptureFailed(_) => (Severity::Error, "Frame capture failed".into()),
        ScanError::Remote(message) => (Severity::Error, truncate_chars(message, ERROR_TEXT_LIMIT)),
        ScanError::Unexpected(_) => (Severity::Error, "Scan failed".into()),
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
