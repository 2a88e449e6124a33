//! Overlay rendering backends
//!
//! A backend owns the native window (and its render thread) for one display.
//! It renders whatever the shared [`DotField`](super::dots::DotField) holds;
//! it never mutates dot state itself.

use super::dots::DotField;
use super::OverlayError;
use crate::capture::DisplayInfo;
use std::sync::Arc;

/// Concrete rendering strategy for a backend window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Transparent, click-through, always-on-top window.
    Layered,
    /// Opaque always-on-top window; reliability fallback.
    Simple,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Layered => write!(f, "layered"),
            BackendKind::Simple => write!(f, "simple"),
        }
    }
}

/// Trait for overlay window backends
pub trait OverlayBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Tear down the native window and stop the render thread.
    fn shutdown(&mut self);
}

/// Create the platform backend for one display.
#[cfg(target_os = "windows")]
pub fn create_backend(
    kind: BackendKind,
    display: &DisplayInfo,
    dots: Arc<DotField>,
    debug_bg: bool,
) -> Result<Box<dyn OverlayBackend>, OverlayError> {
    super::windows::create_backend(kind, display, dots, debug_bg)
}

/// Create the platform backend for one display.
///
/// No native overlay exists for this platform; capture and upload work
/// without a visible overlay.
#[cfg(not(target_os = "windows"))]
pub fn create_backend(
    _kind: BackendKind,
    _display: &DisplayInfo,
    _dots: Arc<DotField>,
    _debug_bg: bool,
) -> Result<Box<dyn OverlayBackend>, OverlayError> {
    Err(OverlayError::Unsupported)
}
