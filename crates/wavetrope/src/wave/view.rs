//! Zoom state and draw layout
//!
//! All widths are in device pixels (CSS pixels × pixel ratio).

use serde::{Deserialize, Serialize};

use crate::config::view::{DEFAULT_MIN_PX_PER_SEC, DEFAULT_PIXEL_RATIO, MAX_RENDER_WIDTH};

/// Horizontal zoom and scroll policy of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomState {
    pub min_px_per_sec: f64,
    pub scroll: bool,
    pub auto_center: bool,
    pub fill: bool,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            min_px_per_sec: DEFAULT_MIN_PX_PER_SEC,
            scroll: false,
            auto_center: false,
            fill: true,
        }
    }
}

/// Result of laying out a buffer for drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawLayout {
    /// Width the audio would take at the zoom level, before fill/scroll policy
    pub nominal_width: u32,
    /// Width actually drawn
    pub width: u32,
    /// First column to draw
    pub start: u32,
    /// One past the last column to draw
    pub end: u32,
}

/// Lay out `duration` seconds of audio for a container `container_width` wide.
///
/// With `fill` on, audio that fits (or any audio when not scrolling) is
/// stretched to the container. Otherwise the wave takes its nominal width,
/// never less than the container. The nominal width is capped at
/// [`MAX_RENDER_WIDTH`].
pub fn draw_layout(duration: f64, zoom: &ZoomState, pixel_ratio: f64, container_width: u32) -> DrawLayout {
    let nominal = duration * zoom.min_px_per_sec * pixel_ratio;
    let nominal_width = if nominal.is_finite() && nominal > 0.0 {
        nominal.round().min(MAX_RENDER_WIDTH as f64) as u32
    } else {
        0
    };

    let width = if zoom.fill && (!zoom.scroll || nominal_width < container_width) {
        container_width
    } else {
        container_width.max(nominal_width)
    };

    DrawLayout {
        nominal_width,
        width,
        start: 0,
        end: width,
    }
}

/// Read-only view of a session's layout, handed to renderers and plugins
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    /// Audio duration in seconds
    pub duration: f64,
    pub min_px_per_sec: f64,
    pub pixel_ratio: f64,
    /// Container width in device pixels
    pub container_width: u32,
    /// Rendered wave width in device pixels
    pub width: u32,
    pub fill: bool,
    pub scroll: bool,
    pub auto_center: bool,
}

impl Default for ViewSnapshot {
    fn default() -> Self {
        let zoom = ZoomState::default();
        Self {
            duration: 0.0,
            min_px_per_sec: zoom.min_px_per_sec,
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            container_width: 0,
            width: 0,
            fill: zoom.fill,
            scroll: zoom.scroll,
            auto_center: zoom.auto_center,
        }
    }
}

impl ViewSnapshot {
    /// Snapshot of a layout computed with [`draw_layout`]
    pub fn new(duration: f64, zoom: &ZoomState, pixel_ratio: f64, layout: &DrawLayout, container_width: u32) -> Self {
        Self {
            duration,
            min_px_per_sec: zoom.min_px_per_sec,
            pixel_ratio,
            container_width,
            width: layout.width,
            fill: zoom.fill,
            scroll: zoom.scroll,
            auto_center: zoom.auto_center,
        }
    }

    /// Device pixels per second actually rendered
    pub fn px_per_sec(&self) -> f64 {
        if self.duration > 0.0 {
            self.width as f64 / self.duration
        } else {
            0.0
        }
    }

    /// Horizontal position (device px) of a progress fraction
    pub fn progress_x(&self, progress: f64) -> f64 {
        progress.clamp(0.0, 1.0) * self.width as f64
    }
}
