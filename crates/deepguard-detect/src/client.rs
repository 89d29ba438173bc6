use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use deepguard_core::detector::{Detector, HealthStatus};
use deepguard_core::errors::ScanError;
use deepguard_core::frame::Frame;
use deepguard_core::result::DetectionResult;
use deepguard_core::settings::SettingsStore;

use crate::wire::WireResponse;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the remote detection service.
///
/// The endpoint is re-read from the settings snapshot on every call, so an
/// external settings change takes effect on the next request.
pub struct HttpDetector {
    client: Client,
    settings: SettingsStore,
}

impl HttpDetector {
    pub fn new(settings: SettingsStore) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            settings,
        }
    }

    fn endpoint(&self) -> String {
        let snapshot = self.settings.snapshot();
        snapshot.api_endpoint.trim_end_matches('/').to_owned()
    }
}

#[derive(Deserialize)]
struct HealthBody {
    app_name: String,
}

#[async_trait]
impl Detector for HttpDetector {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, frame), fields(bytes = frame.len()))]
    async fn analyze(&self, frame: &Frame) -> Result<DetectionResult, ScanError> {
        let url = format!("{}/predict", self.endpoint());

        let part = Part::bytes(frame.bytes.to_vec())
            .file_name("frame.jpg")
            .mime_str(frame.mime)
            .map_err(|e| ScanError::Unexpected(e.to_string()))?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScanError::NetworkUnreachable(format!(
                        "request timed out after {}s",
                        REQUEST_TIMEOUT.as_secs()
                    ))
                } else {
                    ScanError::NetworkUnreachable(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ScanError::NetworkUnreachable(e.to_string()))?;

        // The service encodes error detail as structured JSON even on
        // non-success statuses; a parseable body wins over the status code.
        match serde_json::from_str::<WireResponse>(&body) {
            Ok(wire) => wire.normalize(),
            Err(_) if !status.is_success() => {
                Err(ScanError::Remote(format!("HTTP {}", status.as_u16())))
            }
            Err(e) => Err(ScanError::Remote(format!("unparseable response: {e}"))),
        }
    }

    #[instrument(skip(self))]
    async fn health(&self) -> HealthStatus {
        let url = format!("{}/health", self.endpoint());

        let resp = match self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return HealthStatus::Offline {
                    reason: e.to_string(),
                }
            }
        };

        if !resp.status().is_success() {
            return HealthStatus::Offline {
                reason: format!("HTTP {}", resp.status().as_u16()),
            };
        }

        match resp.json::<HealthBody>().await {
            Ok(body) => HealthStatus::Online {
                app_name: body.app_name,
            },
            Err(e) => HealthStatus::Offline {
                reason: e.to_string(),
            },
        }
    }
}
