use crate::frame::RawFrame;
use crate::ids::ElementId;
use crate::media::PlaybackState;

/// Host-side access to the page's media elements.
///
/// The embedding host (extension content layer, test harness) implements
/// this; the engine never touches the DOM itself. All methods are snapshot
/// reads of current element state and return `None` when the element is
/// gone or its pixels are not readable.
pub trait MediaSurface: Send + Sync {
    /// Current playback state of a video element.
    fn playback(&self, id: &ElementId) -> Option<PlaybackState>;

    /// Draw the video's current frame to an off-screen raster surface at
    /// native resolution. `None` on zero dimensions or a draw failure.
    fn grab_video_frame(&self, id: &ElementId) -> Option<RawFrame>;

    /// Raster-path pixels for an already-loaded image. Fails (`None`) for
    /// cross-origin images without CORS headers; callers try the network
    /// fetch first.
    fn grab_image_pixels(&self, id: &ElementId) -> Option<RawFrame>;

    /// The image element's source URL, when it has one.
    fn image_source(&self, id: &ElementId) -> Option<String>;
}
