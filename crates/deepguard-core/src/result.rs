use serde::{Deserialize, Serialize};

/// Binary classification of a frame, with `Unknown` for anything the
/// service labels unexpectedly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    Fake,
    Real,
    Unknown,
}

impl Prediction {
    /// Parse a remote classification label, case-insensitively.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "FAKE" => Self::Fake,
            "REAL" => Self::Real,
            _ => Self::Unknown,
        }
    }

    pub fn is_fake(&self) -> bool {
        matches!(self, Self::Fake)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fake => "FAKE",
            Self::Real => "REAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized detection outcome. Error outcomes are never encoded here;
/// a scan yields `Result<DetectionResult, ScanError>`, so a result value
/// always carries a valid prediction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub prediction: Prediction,
    /// Display confidence as a percentage, 0–100.
    pub confidence: f64,
    /// Frequency-anomaly score as a fraction, when the service reports one.
    pub frequency_score: Option<f64>,
    /// Server-side processing time in seconds, when reported.
    pub processing_time: Option<f64>,
}

impl DetectionResult {
    pub fn new(prediction: Prediction, confidence: f64) -> Self {
        Self {
            prediction,
            confidence,
            frequency_score: None,
            processing_time: None,
        }
    }

    pub fn with_frequency_score(mut self, score: f64) -> Self {
        self.frequency_score = Some(score);
        self
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = Some(seconds);
        self
    }
}

/// Normalize a remote confidence value to a display percentage.
///
/// The service reports confidence either as a fraction in `[0, 1]` or
/// already as a percentage in `(1, 100]`; the value's range decides which.
/// Out-of-range values pass through unchanged.
pub fn normalize_confidence(raw: f64) -> f64 {
    if raw > 1.0 && raw <= 100.0 {
        raw
    } else if (0.0..=1.0).contains(&raw) {
        raw * 100.0
    } else {
        raw
    }
}
