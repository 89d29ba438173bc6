use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use deepguard_core::detector::{Detector, HealthStatus};
use deepguard_core::errors::ScanError;
use deepguard_core::frame::Frame;
use deepguard_core::result::{DetectionResult, Prediction};

/// Pre-programmed outcomes for deterministic testing without a service.
#[derive(Clone, Debug)]
pub enum MockOutcome {
    Result(DetectionResult),
    Error(ScanError),
    /// Wait a duration, then yield the inner outcome.
    Delay(Duration, Box<MockOutcome>),
}

impl MockOutcome {
    /// Convenience: a FAKE result at the given display confidence.
    pub fn fake(confidence: f64) -> Self {
        Self::Result(DetectionResult::new(Prediction::Fake, confidence))
    }

    /// Convenience: a REAL result at the given display confidence.
    pub fn real(confidence: f64) -> Self {
        Self::Result(DetectionResult::new(Prediction::Real, confidence))
    }

    /// Convenience: wrap any outcome with a delay.
    pub fn delayed(delay: Duration, inner: MockOutcome) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock detector that returns pre-programmed outcomes in sequence.
pub struct MockDetector {
    outcomes: Vec<MockOutcome>,
    call_count: AtomicUsize,
    health: Mutex<HealthStatus>,
}

impl MockDetector {
    pub fn new(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes,
            call_count: AtomicUsize::new(0),
            health: Mutex::new(HealthStatus::Online {
                app_name: "mock".into(),
            }),
        }
    }

    /// A detector that answers every call with the same outcome.
    pub fn always(outcome: MockOutcome, calls: usize) -> Self {
        Self::new(vec![outcome; calls])
    }

    pub fn with_health(self, health: HealthStatus) -> Self {
        *self.health.lock() = health;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Detector for MockDetector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyze(&self, _frame: &Frame) -> Result<DetectionResult, ScanError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);

        let Some(outcome) = self.outcomes.get(idx) else {
            return Err(ScanError::Unexpected(format!(
                "MockDetector: no outcome configured for call {idx}"
            )));
        };

        let mut current = outcome;
        loop {
            match current {
                MockOutcome::Result(result) => return Ok(result.clone()),
                MockOutcome::Error(err) => return Err(err.clone()),
                MockOutcome::Delay(duration, inner) => {
                    tokio::time::sleep(*duration).await;
                    current = inner;
                }
            }
        }
    }

    async fn health(&self) -> HealthStatus {
        self.health.lock().clone()
    }
}
