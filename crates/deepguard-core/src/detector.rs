use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ScanError;
use crate::frame::Frame;
use crate::result::DetectionResult;

/// Outcome of probing the detection service's health endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Online { app_name: String },
    Offline { reason: String },
}

impl HealthStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }
}

/// Trait implemented by detection backends (the HTTP service, mocks).
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    /// Classify one encoded frame. Exactly one of a valid result or a
    /// `ScanError` comes back; transport and remote failures are already
    /// normalized into the error taxonomy.
    async fn analyze(&self, frame: &Frame) -> Result<DetectionResult, ScanError>;

    /// Bounded-wait health probe; any failure or timeout is `Offline`.
    async fn health(&self) -> HealthStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_status() {
        let status = HealthStatus::Online {
            app_name: "Deepfake Detection API".into(),
        };
        assert!(status.is_online());
    }

    #[test]
    fn offline_status() {
        let status = HealthStatus::Offline {
            reason: "connection refused".into(),
        };
        assert!(!status.is_online());
    }

    #[test]
    fn health_status_serde_roundtrip() {
        let statuses = vec![
            HealthStatus::Online {
                app_name: "api".into(),
            },
            HealthStatus::Offline {
                reason: "timeout".into(),
            },
        ];
        for status in &statuses {
            let json = serde_json::to_string(status).unwrap();
            let parsed: HealthStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(*status, parsed);
        }
    }
}
