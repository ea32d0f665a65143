//! Waveform subsystem
//!
//! Peak extraction, zoom layout, and the host render boundary.

pub mod peaks;
pub mod renderer;
pub mod timeline;
pub mod view;

pub use peaks::{compute_peak_window, compute_peaks, Peak, PeakSet};
pub use renderer::{NullRenderer, WaveFrame, WaveRenderer};
pub use timeline::{compute_timeline, TimelineLayout, TimelineParams, TimelinePlugin, TimelineSurface};
pub use view::{draw_layout, DrawLayout, ViewSnapshot, ZoomState};
