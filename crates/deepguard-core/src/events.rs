use serde::{Deserialize, Serialize};

use crate::ids::{ElementId, ScanId};
use crate::media::{MediaDescriptor, MediaKind, PlaybackState};
use crate::result::DetectionResult;

/// Observations produced by an event source watching the page.
///
/// Discovery consumes these instead of hooking DOM callbacks directly, so
/// qualification and the controller state machine are testable without a
/// live rendering surface. Sources may re-emit the same element on every
/// pass; idempotence is discovery's job, not theirs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    ImageSeen {
        desc: MediaDescriptor,
    },
    VideoSeen {
        desc: MediaDescriptor,
        playback: PlaybackState,
    },
    PlaybackEnded {
        id: ElementId,
    },
}

impl DiscoveryEvent {
    pub fn element_id(&self) -> &ElementId {
        match self {
            Self::ImageSeen { desc } | Self::VideoSeen { desc, .. } => &desc.id,
            Self::PlaybackEnded { id } => id,
        }
    }
}

/// Why a scan attempt was dropped without issuing a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A previous request for this controller is still outstanding.
    InFlight,
}

/// Lifecycle events emitted by the engine for observers (stats UI, logs).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    #[serde(rename = "controller_started")]
    ControllerStarted {
        element_id: ElementId,
        kind: MediaKind,
    },

    #[serde(rename = "scan_started")]
    ScanStarted {
        element_id: ElementId,
        scan_id: ScanId,
    },

    #[serde(rename = "scan_completed")]
    ScanCompleted {
        element_id: ElementId,
        scan_id: ScanId,
        result: DetectionResult,
    },

    #[serde(rename = "scan_failed")]
    ScanFailed {
        element_id: ElementId,
        scan_id: ScanId,
        kind: String,
    },

    #[serde(rename = "scan_skipped")]
    ScanSkipped {
        element_id: ElementId,
        reason: SkipReason,
    },

    #[serde(rename = "scanning_paused")]
    ScanningPaused {
        element_id: ElementId,
    },

    #[serde(rename = "scanning_resumed")]
    ScanningResumed {
        element_id: ElementId,
    },

    #[serde(rename = "controller_stopped")]
    ControllerStopped {
        element_id: ElementId,
    },
}

impl ScanEvent {
    pub fn element_id(&self) -> &ElementId {
        match self {
            Self::ControllerStarted { element_id, .. }
            | Self::ScanStarted { element_id, .. }
            | Self::ScanCompleted { element_id, .. }
            | Self::ScanFailed { element_id, .. }
            | Self::ScanSkipped { element_id, .. }
            | Self::ScanningPaused { element_id }
            | Self::ScanningResumed { element_id }
            | Self::ControllerStopped { element_id } => element_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ControllerStarted { .. } => "controller_started",
            Self::ScanStarted { .. } => "scan_started",
            Self::ScanCompleted { .. } => "scan_completed",
            Self::ScanFailed { .. } => "scan_failed",
            Self::ScanSkipped { .. } => "scan_skipped",
            Self::ScanningPaused { .. } => "scanning_paused",
            Self::ScanningResumed { .. } => "scanning_resumed",
            Self::ControllerStopped { .. } => "controller_stopped",
        }
    }
}
