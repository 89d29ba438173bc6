use serde::Deserialize;

use deepguard_core::errors::ScanError;
use deepguard_core::result::{normalize_confidence, DetectionResult, Prediction};

/// Raw response body from the detection service.
///
/// The service has shipped two field names for the classification label
/// (`prediction` vs `label`) and two for confidence (`confidence` vs
/// `adjusted_confidence`); both shapes are accepted here and nowhere else.
/// Error detail arrives as a structured `error` field, possibly alongside
/// a non-success HTTP status.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WireResponse {
    pub prediction: Option<String>,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    pub adjusted_confidence: Option<f64>,
    pub frequency_score: Option<f64>,
    pub processing_time: Option<f64>,
    pub error: Option<String>,
}

impl WireResponse {
    /// Collapse the dual-shaped body into the typed result, preferring
    /// `prediction` over `label` and `confidence` over
    /// `adjusted_confidence`. Confidence is normalized to a percentage.
    pub fn normalize(self) -> Result<DetectionResult, ScanError> {
        if let Some(error) = self.error {
            return Err(ScanError::from_remote(&error));
        }

        let label = self
            .prediction
            .or(self.label)
            .ok_or_else(|| ScanError::Remote("response carried neither a prediction nor an error".into()))?;

        let confidence = self.confidence.or(self.adjusted_confidence).unwrap_or(0.0);

        Ok(DetectionResult {
            prediction: Prediction::from_label(&label),
            confidence: normalize_confidence(confidence),
            frequency_score: self.frequency_score,
            processing_time: self.processing_time,
        })
    }
}
