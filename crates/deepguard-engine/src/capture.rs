use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use tracing::debug;

use deepguard_core::errors::ScanError;
use deepguard_core::frame::{Frame, RawFrame, MIME_JPEG};
use deepguard_core::ids::ElementId;
use deepguard_core::media::MediaDescriptor;
use deepguard_core::surface::MediaSurface;

/// JPEG quality for encoded frames, out of 100.
pub const JPEG_QUALITY: u8 = 80;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Encode raw RGB pixels as a JPEG payload.
pub fn encode_jpeg(frame: &RawFrame) -> Result<Frame, ScanError> {
    if frame.is_empty() {
        return Err(ScanError::CaptureFailed("zero-dimension frame".into()));
    }
    if frame.pixels.len() != frame.expected_len() {
        return Err(ScanError::CaptureFailed(format!(
            "pixel buffer length {} does not match {}x{} RGB",
            frame.pixels.len(),
            frame.width,
            frame.height
        )));
    }

    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder
        .encode(&frame.pixels, frame.width, frame.height, image::ColorType::Rgb8)
        .map_err(|e| ScanError::CaptureFailed(e.to_string()))?;

    Ok(Frame::jpeg(buf))
}

/// Decode a `data:` URL into an encoded frame without touching the network.
pub(crate) fn decode_data_url(url: &str) -> Result<Frame, ScanError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ScanError::CaptureFailed("not a data URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ScanError::CaptureFailed("malformed data URL".into()))?;
    if !meta.ends_with(";base64") {
        return Err(ScanError::CaptureFailed(
            "unsupported data URL encoding".into(),
        ));
    }

    let mime = Frame::mime_from_content_type(meta.trim_end_matches(";base64"));
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| ScanError::CaptureFailed(format!("base64 decode failed: {e}")))?;

    Ok(Frame {
        bytes: bytes.into(),
        mime,
    })
}

/// Extracts encoded payloads from page elements.
///
/// Videos go through the host's raster grab at native resolution. Images
/// are fetched over the network first to avoid canvas tainting for
/// cross-origin images, with the raster grab as the same-origin fallback.
pub struct FrameCapture {
    surface: Arc<dyn MediaSurface>,
    client: Client,
}

impl FrameCapture {
    pub fn new(surface: Arc<dyn MediaSurface>) -> Self {
        Self {
            surface,
            client: Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Grab and encode the video's current frame.
    pub fn video_frame(&self, id: &ElementId) -> Result<Frame, ScanError> {
        let raw = self
            .surface
            .grab_video_frame(id)
            .ok_or_else(|| ScanError::CaptureFailed("no frame available".into()))?;
        encode_jpeg(&raw)
    }

    /// Obtain an image's bytes, trying the network path before the raster
    /// fallback. Both failing is the single most common recoverable
    /// failure and surfaces as the distinct "cannot access image" state.
    ///
    /// The source URL is re-read from the live element; the discovery
    /// snapshot is only a fallback for elements already gone.
    pub async fn image_frame(&self, desc: &MediaDescriptor) -> Result<Frame, ScanError> {
        let src = self
            .surface
            .image_source(&desc.id)
            .or_else(|| desc.src.clone());

        let mut fetch_failure = None;
        if let Some(src) = src.as_deref() {
            match self.fetch_source(src).await {
                Ok(frame) => return Ok(frame),
                Err(err) => {
                    debug!(element_id = %desc.id, error = %err, "image fetch failed, trying raster fallback");
                    fetch_failure = Some(err);
                }
            }
        }

        match self.surface.grab_image_pixels(&desc.id) {
            Some(raw) => encode_jpeg(&raw)
                .map_err(|err| ScanError::ImageInaccessible(format!("raster encode failed: {err}"))),
            None => Err(ScanError::ImageInaccessible(match fetch_failure {
                Some(err) => format!("fetch failed ({err}); raster grab unavailable"),
                None => "no source URL and raster grab unavailable".into(),
            })),
        }
    }

    async fn fetch_source(&self, src: &str) -> Result<Frame, ScanError> {
        if src.starts_with("data:") {
            return decode_data_url(src);
        }
        if !src.starts_with("http://") && !src.starts_with("https://") {
            return Err(ScanError::CaptureFailed("unsupported source scheme".into()));
        }

        let resp = self
            .client
            .get(src)
            .send()
            .await
            .map_err(|e| ScanError::CaptureFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScanError::CaptureFailed(format!(
                "HTTP {}",
                resp.status().as_u16()
            )));
        }

        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(Frame::mime_from_content_type)
            .unwrap_or(MIME_JPEG);

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ScanError::CaptureFailed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ScanError::CaptureFailed("empty response body".into()));
        }

        Ok(Frame { bytes, mime })
    }
}
