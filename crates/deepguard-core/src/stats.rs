use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::result::DetectionResult;

/// Persistent counters shown in the external UI. Monotonically
/// non-decreasing except for an explicit user-initiated reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub videos_scanned: u64,
    pub deepfakes_found: u64,
}

/// Sink for completed detections. Only successful results reach `record`;
/// errored scans never touch the counters.
pub trait StatsSink: Send + Sync {
    fn record(&self, result: &DetectionResult);
    fn snapshot(&self) -> Stats;
    fn reset(&self);
}

/// In-memory implementation. Hosts that persist counters wrap or replace
/// this behind the same trait.
#[derive(Debug, Default)]
pub struct MemoryStats {
    scanned: AtomicU64,
    fakes: AtomicU64,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsSink for MemoryStats {
    fn record(&self, result: &DetectionResult) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
        if result.prediction.is_fake() {
            self.fakes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> Stats {
        Stats {
            videos_scanned: self.scanned.load(Ordering::Relaxed),
            deepfakes_found: self.fakes.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.scanned.store(0, Ordering::Relaxed);
        self.fakes.store(0, Ordering::Relaxed);
    }
}
