//! Always-on-top overlay surface for tap dots
//!
//! The surface pairs platform-independent dot state with an optional native
//! rendering backend. Losing the backend (unsupported platform, window
//! creation failure) degrades to an invisible overlay; it never takes the
//! capture pipeline down with it.

pub mod backend;
pub mod dots;

#[cfg(target_os = "windows")]
mod windows;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::DisplayInfo;
use backend::{BackendKind, OverlayBackend};
use dots::{DotField, DotStyle};

/// Errors that can occur while bringing up an overlay window
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Window layering unavailable: {0}")]
    LayeringFailed(String),

    #[error("Overlay window creation failed: {0}")]
    WindowCreationFailed(String),

    #[error("Overlay rendering is not supported on this platform")]
    Unsupported,
}

/// Configured rendering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// Try `layered`, fall back to `simple`.
    #[default]
    Auto,
    Layered,
    Simple,
}

/// The presenter-facing overlay: fading tap dots over one display
pub struct OverlaySurface {
    dots: Arc<DotField>,
    backend: Option<Box<dyn OverlayBackend>>,
}

impl OverlaySurface {
    /// Build the surface for `display`, resolving `mode` against what the
    /// platform can actually provide.
    pub fn create(
        mode: OverlayMode,
        style: DotStyle,
        debug_bg: bool,
        display: &DisplayInfo,
    ) -> Self {
        let dots = Arc::new(DotField::new(style));
        let backend = Self::open_backend(mode, |kind| {
            backend::create_backend(kind, display, dots.clone(), debug_bg)
        });

        match &backend {
            Some(b) => tracing::info!("Overlay ready in {} mode", b.kind()),
            None => tracing::warn!(
                "No overlay window available; captures will run without visible dots"
            ),
        }

        Self { dots, backend }
    }

    /// Resolve the configured mode into a running backend, applying the
    /// auto-fallback policy. The factory is injected so the policy can be
    /// exercised without creating native windows.
    fn open_backend<F>(mode: OverlayMode, factory: F) -> Option<Box<dyn OverlayBackend>>
    where
        F: Fn(BackendKind) -> Result<Box<dyn OverlayBackend>, OverlayError>,
    {
        let attempt = |kind: BackendKind| match factory(kind) {
            Ok(backend) => Some(backend),
            Err(err) => {
                tracing::warn!("{} overlay unavailable: {}", kind, err);
                None
            }
        };

        match mode {
            OverlayMode::Layered => attempt(BackendKind::Layered),
            OverlayMode::Simple => attempt(BackendKind::Simple),
            OverlayMode::Auto => {
                attempt(BackendKind::Layered).or_else(|| attempt(BackendKind::Simple))
            }
        }
    }

    /// A surface with dot state but no native window. Used when every
    /// backend is unavailable and by pipeline tests.
    pub fn headless(style: DotStyle) -> Self {
        Self {
            dots: Arc::new(DotField::new(style)),
            backend: None,
        }
    }

    /// Schedule a new fully opaque dot at a pixel position.
    pub fn add_dot(&self, x_px: i32, y_px: i32) {
        self.dots.add(x_px, y_px);
    }

    /// Remove all dots immediately.
    pub fn clear(&self) {
        self.dots.clear();
    }

    /// Shared dot state, readable by render backends and tests.
    pub fn dots(&self) -> Arc<DotField> {
        self.dots.clone()
    }

    /// Which backend is rendering, if any.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    pub fn shutdown(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.shutdown();
        }
    }
}

impl Drop for OverlaySurface {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dots::Color;
    use std::time::Duration;

    struct FakeBackend(BackendKind);

    impl OverlayBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.0
        }

        fn shutdown(&mut self) {}
    }

    fn style() -> DotStyle {
        DotStyle {
            color: Color { r: 1, g: 2, b: 3 },
            radius_px: 4,
            fade: Duration::from_secs(1),
        }
    }

    fn display() -> DisplayInfo {
        DisplayInfo {
            id: 1,
            name: "main".to_string(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            scale_factor: 1.0,
            is_primary: true,
        }
    }

    fn resolve<F>(mode: OverlayMode, factory: F) -> Option<BackendKind>
    where
        F: Fn(BackendKind) -> Result<Box<dyn OverlayBackend>, OverlayError>,
    {
        OverlaySurface::open_backend(mode, factory).map(|b| b.kind())
    }

    fn only_simple(kind: BackendKind) -> Result<Box<dyn OverlayBackend>, OverlayError> {
        match kind {
            BackendKind::Layered => {
                Err(OverlayError::LayeringFailed("no compositor".to_string()))
            }
            BackendKind::Simple => Ok(Box::new(FakeBackend(kind))),
        }
    }

    #[test]
    fn auto_falls_back_to_simple_when_layering_fails() {
        assert_eq!(
            resolve(OverlayMode::Auto, only_simple),
            Some(BackendKind::Simple)
        );
    }

    fn any_backend(kind: BackendKind) -> Result<Box<dyn OverlayBackend>, OverlayError> {
        Ok(Box::new(FakeBackend(kind)))
    }

    #[test]
    fn auto_prefers_layered_when_available() {
        assert_eq!(
            resolve(OverlayMode::Auto, any_backend),
            Some(BackendKind::Layered)
        );
    }

    #[test]
    fn explicit_layered_does_not_fall_back() {
        assert_eq!(resolve(OverlayMode::Layered, only_simple), None);
    }

    #[test]
    fn surface_works_without_a_backend() {
        let surface = OverlaySurface::create(OverlayMode::Simple, style(), false, &display());
        // On platforms without native overlays the backend is absent, and on
        // Windows a real window may not be creatable in a test session; dot
        // state must work either way.
        surface.add_dot(100, 100);
        assert!(!surface.dots().is_empty());
        surface.clear();
        assert!(surface.dots().is_empty());
    }

    #[test]
    fn overlay_mode_deserializes_lowercase() {
        let mode: OverlayMode = serde_json::from_str("\"layered\"").unwrap();
        assert_eq!(mode, OverlayMode::Layered);
        let mode: OverlayMode = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(mode, OverlayMode::Auto);
    }
}
