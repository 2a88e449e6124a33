//! Screen capture
//!
//! Display enumeration and single-frame grabs behind a small trait so the
//! capture pipeline can run against scripted frames in tests. The default
//! implementation lives in `screen` and is backed by xcap.

pub mod screen;

use thiserror::Error;

pub use screen::XcapGrabber;

/// Errors that can occur while grabbing or encoding a frame
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No displays available")]
    NoDisplays,

    #[error("Monitor index {index} out of range ({count} available)")]
    MonitorOutOfRange { index: usize, count: usize },

    #[error("Screen grab failed: {0}")]
    GrabFailed(String),

    #[error("Image encoding failed: {0}")]
    EncodingError(String),
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Position and pixel size of one display in the virtual desktop
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    /// Left edge in virtual-desktop coordinates
    pub x: i32,
    /// Top edge in virtual-desktop coordinates
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f32,
    pub is_primary: bool,
}

/// Raw frame data from a capture source
#[derive(Debug)]
pub struct CapturedFrame {
    /// Tightly packed RGBA pixel data
    pub data: Vec<u8>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,
}

/// Trait for single-frame screen grabbers
///
/// A grabber is bound to one display at construction time and is shared by
/// the coordinator (frames) and the overlay (geometry).
pub trait ScreenGrabber: Send + Sync {
    /// Geometry of the display this grabber captures
    fn display(&self) -> &DisplayInfo;

    /// Grab one frame of the bound display
    fn grab(&self) -> CaptureResult<CapturedFrame>;
}

/// Encode a raw frame as JPEG at the given quality.
pub fn encode_jpeg(frame: CapturedFrame, quality: u8) -> CaptureResult<Vec<u8>> {
    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.data)
        .ok_or_else(|| CaptureError::EncodingError("pixel buffer size mismatch".to_string()))?;

    // JPEG has no alpha channel
    let rgb = image::DynamicImage::ImageRgba8(image).to_rgb8();

    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| CaptureError::EncodingError(e.to_string()))?;

    Ok(out)
}

/// Map a normalized tap coordinate onto a display.
///
/// (0.0, 0.0) is the display's top-left pixel and (1.0, 1.0) its
/// bottom-right pixel, in virtual-desktop coordinates. Out-of-range input is
/// clamped to the display edge. Mixed-DPI setups use each display's own
/// reported pixel bounds.
pub fn normalized_to_pixel(x_norm: f64, y_norm: f64, display: &DisplayInfo) -> (i32, i32) {
    let x_norm = x_norm.clamp(0.0, 1.0);
    let y_norm = y_norm.clamp(0.0, 1.0);

    let max_x = display.width.saturating_sub(1) as f64;
    let max_y = display.height.saturating_sub(1) as f64;

    let px = display.x + (x_norm * max_x).round() as i32;
    let py = display.y + (y_norm * max_y).round() as i32;
    (px, py)
}
