use bytes::Bytes;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";

/// Unencoded RGB8 pixels grabbed from a raster surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB8, `width * height * 3` bytes.
    pub pixels: Vec<u8>,
}

impl RawFrame {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// An encoded image payload ready to be sent to the detection service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Bytes,
    pub mime: &'static str,
}

impl Frame {
    pub fn jpeg(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: MIME_JPEG,
        }
    }

    pub fn png(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: MIME_PNG,
        }
    }

    /// Map a `Content-Type` header value onto one of the supported mimes.
    /// Anything that is not recognizably PNG is treated as JPEG.
    pub fn mime_from_content_type(content_type: &str) -> &'static str {
        if content_type.trim().to_ascii_lowercase().starts_with(MIME_PNG) {
            MIME_PNG
        } else {
            MIME_JPEG
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
