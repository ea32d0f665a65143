//! Render boundary
//!
//! The engine computes peaks and progress; pixels are the host's business.

use super::peaks::PeakSet;
use super::view::ViewSnapshot;

/// One frame of waveform drawing
#[derive(Debug, Clone, Copy)]
pub struct WaveFrame<'a> {
    pub peaks: &'a PeakSet,
    /// Total rendered width in device pixels
    pub width: u32,
    /// First column covered by `peaks`
    pub start: u32,
    /// One past the last column covered by `peaks`
    pub end: u32,
}

/// Host-side waveform drawing surface
pub trait WaveRenderer: Send {
    /// Current container width in device pixels
    fn container_width(&self) -> u32;

    /// Draw a run of peak columns
    fn draw_wave(&mut self, frame: &WaveFrame<'_>);

    /// Move the progress indicator to `progress` (0.0..=1.0)
    fn render_progress(&mut self, progress: f64, view: &ViewSnapshot);
}

/// Renderer that draws nothing, for headless sessions
#[derive(Debug, Clone, Copy)]
pub struct NullRenderer {
    width: u32,
}

impl NullRenderer {
    pub fn new(width: u32) -> Self {
        Self { width }
    }
}

impl Default for NullRenderer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WaveRenderer for NullRenderer {
    fn container_width(&self) -> u32 {
        self.width
    }

    fn draw_wave(&mut self, _frame: &WaveFrame<'_>) {}

    fn render_progress(&mut self, _progress: f64, _view: &ViewSnapshot) {}
}
