//! In-memory surfaces and page scanners for tests and headless hosts.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use deepguard_core::frame::RawFrame;
use deepguard_core::ids::{BadgeId, ElementId};
use deepguard_core::media::{MediaDescriptor, MediaKind, PlaybackState, Rect, Viewport};
use deepguard_core::surface::MediaSurface;

use crate::render::{RenderOp, RenderSurface};
use crate::source::{PageItem, PageScanner};

/// Records every render op and tracks which badges are currently live per
/// container, so tests can assert the one-badge invariant directly.
#[derive(Default)]
pub struct RecordingSurface {
    ops: Mutex<Vec<RenderOp>>,
    live: Mutex<HashMap<ElementId, HashSet<BadgeId>>>,
}

impl RecordingSurface {
    pub fn ops(&self) -> Vec<RenderOp> {
        self.ops.lock().clone()
    }

    pub fn count_ops(&self, predicate: impl Fn(&RenderOp) -> bool) -> usize {
        self.ops.lock().iter().filter(|op| predicate(op)).count()
    }

    pub fn live_badges(&self, id: &ElementId) -> usize {
        self.live.lock().get(id).map(HashSet::len).unwrap_or(0)
    }
}

impl RenderSurface for RecordingSurface {
    fn apply(&self, op: RenderOp) {
        match &op {
            RenderOp::ShowBadge { badge } => {
                self.live
                    .lock()
                    .entry(badge.element_id.clone())
                    .or_default()
                    .insert(badge.id.clone());
            }
            RenderOp::RemoveBadge {
                element_id,
                badge_id,
            } => {
                if let Some(badges) = self.live.lock().get_mut(element_id) {
                    badges.remove(badge_id);
                }
            }
            RenderOp::ClearBadges { element_id } => {
                self.live.lock().remove(element_id);
            }
            _ => {}
        }
        self.ops.lock().push(op);
    }
}

/// Programmable media surface: tests set per-element playback state and
/// pixel data.
#[derive(Default)]
pub struct FakeMediaSurface {
    playback: Mutex<HashMap<ElementId, PlaybackState>>,
    video_frames: Mutex<HashMap<ElementId, RawFrame>>,
    image_pixels: Mutex<HashMap<ElementId, RawFrame>>,
    sources: Mutex<HashMap<ElementId, String>>,
}

impl FakeMediaSurface {
    pub fn set_playback(&self, id: &ElementId, state: PlaybackState) {
        self.playback.lock().insert(id.clone(), state);
    }

    pub fn set_video_frame(&self, id: &ElementId, frame: RawFrame) {
        self.video_frames.lock().insert(id.clone(), frame);
    }

    pub fn clear_video_frame(&self, id: &ElementId) {
        self.video_frames.lock().remove(id);
    }

    pub fn set_image_pixels(&self, id: &ElementId, frame: RawFrame) {
        self.image_pixels.lock().insert(id.clone(), frame);
    }

    pub fn set_source(&self, id: &ElementId, src: impl Into<String>) {
        self.sources.lock().insert(id.clone(), src.into());
    }
}

impl MediaSurface for FakeMediaSurface {
    fn playback(&self, id: &ElementId) -> Option<PlaybackState> {
        self.playback.lock().get(id).copied()
    }

    fn grab_video_frame(&self, id: &ElementId) -> Option<RawFrame> {
        self.video_frames.lock().get(id).cloned()
    }

    fn grab_image_pixels(&self, id: &ElementId) -> Option<RawFrame> {
        self.image_pixels.lock().get(id).cloned()
    }

    fn image_source(&self, id: &ElementId) -> Option<String> {
        self.sources.lock().get(id).cloned()
    }
}

/// Fixed page contents for driving the poll driver in tests.
#[derive(Default)]
pub struct StaticPage {
    items: Mutex<Vec<PageItem>>,
}

impl StaticPage {
    pub fn new(items: Vec<PageItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    pub fn set_items(&self, items: Vec<PageItem>) {
        *self.items.lock() = items;
    }
}

impl PageScanner for StaticPage {
    fn media(&self) -> Vec<PageItem> {
        self.items.lock().clone()
    }
}

/// A qualifying image descriptor: 400x400, centered in a 1280x720 viewport.
pub fn image_descriptor(id: &ElementId) -> MediaDescriptor {
    MediaDescriptor {
        id: id.clone(),
        kind: MediaKind::Image,
        platform: "Web".into(),
        width: 400,
        height: 400,
        rect: Rect {
            top: 100.0,
            bottom: 500.0,
            left: 100.0,
            right: 500.0,
        },
        viewport: Viewport {
            width: 1280.0,
            height: 720.0,
        },
        src: None,
        inside_overlay: false,
    }
}

/// A video descriptor at a typical rendered size.
pub fn video_descriptor(id: &ElementId) -> MediaDescriptor {
    MediaDescriptor {
        id: id.clone(),
        kind: MediaKind::Video,
        platform: "Web".into(),
        width: 640,
        height: 360,
        rect: Rect {
            top: 50.0,
            bottom: 410.0,
            left: 0.0,
            right: 640.0,
        },
        viewport: Viewport {
            width: 1280.0,
            height: 720.0,
        },
        src: None,
        inside_overlay: false,
    }
}

/// An actively-playing playback snapshot.
pub fn playing() -> PlaybackState {
    PlaybackState {
        current_time: 2.0,
        paused: false,
        ended: false,
        ready_state: 4,
    }
}

/// Solid-gray raw pixels at the given dimensions.
pub fn raw_frame(width: u32, height: u32) -> RawFrame {
    RawFrame {
        width,
        height,
        pixels: vec![0x7f; width as usize * height as usize * 3],
    }
}
