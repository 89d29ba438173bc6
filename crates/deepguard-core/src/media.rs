use serde::{Deserialize, Serialize};

use crate::ids::ElementId;

/// What kind of media element a descriptor refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

/// Rendered position of an element, relative to the viewport origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

/// Visible window dimensions at observation time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Playback snapshot of a video element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_time: f64,
    pub paused: bool,
    pub ended: bool,
    /// Buffered readiness, 0–4. Values above 2 mean enough data to play.
    pub ready_state: u8,
}

impl PlaybackState {
    /// Actively playing: has advanced past zero, not paused, not ended,
    /// and sufficiently buffered.
    pub fn is_playing(&self) -> bool {
        self.current_time > 0.0 && !self.paused && !self.ended && self.ready_state > 2
    }
}

/// Snapshot of a media element as observed on the page.
///
/// The synthetic `ElementId` is assigned by the event source the first time
/// the element is observed and is stable for the element's lifetime on the
/// page; the engine never holds the underlying node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub id: ElementId,
    pub kind: MediaKind,
    /// Free-form tag describing the originating site ("Instagram", "Web", …).
    pub platform: String,
    /// Rendered width in pixels.
    pub width: u32,
    /// Rendered height in pixels.
    pub height: u32,
    pub rect: Rect,
    pub viewport: Viewport,
    /// Source URL, when the element exposes one.
    pub src: Option<String>,
    /// True when the element sits inside one of our own rendered overlays.
    pub inside_overlay: bool,
}

impl MediaDescriptor {
    /// Width over height; zero when the element has no height.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}
