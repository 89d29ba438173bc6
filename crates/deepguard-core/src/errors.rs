/// Failure taxonomy for a single scan attempt. Every variant is contained
/// at the scan boundary; none of them stops a controller's timer.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ScanError {
    /// Video frame could not be grabbed or encoded (zero dimensions,
    /// encoder failure). The attempt is abandoned without a request.
    #[error("could not capture frame: {0}")]
    CaptureFailed(String),

    /// Both image byte paths failed: the network fetch (CORS, transport)
    /// and the raster fallback (tainted canvas).
    #[error("cannot access image: {0}")]
    ImageInaccessible(String),

    /// Transport-level failure reaching the detection service, including
    /// request timeout. Rendered as "API offline".
    #[error("detection service unreachable: {0}")]
    NetworkUnreachable(String),

    /// The service responded but found no analyzable subject.
    #[error("no face detected: {0}")]
    NoFaceDetected(String),

    /// Any other structured error reported by the service.
    #[error("detection service error: {0}")]
    Remote(String),

    /// A failure not anticipated by the taxonomy above.
    #[error("unexpected scan failure: {0}")]
    Unexpected(String),
}

impl ScanError {
    /// Short classification string for logging and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CaptureFailed(_) => "capture_failed",
            Self::ImageInaccessible(_) => "image_inaccessible",
            Self::NetworkUnreachable(_) => "network_unreachable",
            Self::NoFaceDetected(_) => "no_face_detected",
            Self::Remote(_) => "remote_error",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// Informational failures get a non-alarming rendering.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::NoFaceDetected(_))
    }

    /// Classify a structured error message from the detection service.
    pub fn from_remote(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("no face") {
            Self::NoFaceDetected(message.to_owned())
        } else if lower.contains("file") || lower.contains("load") {
            Self::CaptureFailed(message.to_owned())
        } else {
            Self::Remote(message.to_owned())
        }
    }
}
