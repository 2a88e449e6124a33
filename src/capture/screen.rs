//! xcap-backed screen grabber
//!
//! Displays are re-enumerated on every grab: monitor layouts change when a
//! projector is plugged in mid-session, and the enumeration is cheap next to
//! the grab itself.

use super::{CaptureError, CaptureResult, CapturedFrame, DisplayInfo, ScreenGrabber};
use xcap::Monitor;

pub struct XcapGrabber {
    display: DisplayInfo,
    monitor_index: usize,
}

impl XcapGrabber {
    /// Bind a grabber to the monitor at `monitor_index`. An out-of-range
    /// index falls back to the first monitor with a warning, matching what a
    /// presenter would want when a second screen is missing.
    pub fn new(monitor_index: usize) -> CaptureResult<Self> {
        let monitors = Self::enumerate()?;

        let index = if monitor_index >= monitors.len() {
            tracing::warn!(
                "Monitor index {} not found ({} available), using primary monitor",
                monitor_index,
                monitors.len()
            );
            0
        } else {
            monitor_index
        };

        let selected = Self::display_info(&monitors[index]);
        tracing::info!(
            "Using monitor {}: {} {}x{} at ({}, {})",
            index,
            selected.name,
            selected.width,
            selected.height,
            selected.x,
            selected.y
        );

        Ok(Self {
            display: selected,
            monitor_index: index,
        })
    }

    fn enumerate() -> CaptureResult<Vec<Monitor>> {
        let monitors =
            Monitor::all().map_err(|e| CaptureError::GrabFailed(e.to_string()))?;
        if monitors.is_empty() {
            return Err(CaptureError::NoDisplays);
        }
        Ok(monitors)
    }

    fn display_info(monitor: &Monitor) -> DisplayInfo {
        DisplayInfo {
            id: monitor.id(),
            name: monitor.name().to_string(),
            x: monitor.x(),
            y: monitor.y(),
            width: monitor.width(),
            height: monitor.height(),
            scale_factor: monitor.scale_factor(),
            is_primary: monitor.is_primary(),
        }
    }
}

impl ScreenGrabber for XcapGrabber {
    fn display(&self) -> &DisplayInfo {
        &self.display
    }

    fn grab(&self) -> CaptureResult<CapturedFrame> {
        let monitors = Self::enumerate()?;
        let monitor = monitors
            .get(self.monitor_index)
            .ok_or(CaptureError::MonitorOutOfRange {
                index: self.monitor_index,
                count: monitors.len(),
            })?;

        let image = monitor
            .capture_image()
            .map_err(|e| CaptureError::GrabFailed(e.to_string()))?;

        let (width, height) = (image.width(), image.height());
        Ok(CapturedFrame {
            data: image.into_raw(),
            width,
            height,
        })
    }
}
