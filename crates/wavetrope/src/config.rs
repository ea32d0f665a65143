//! Configuration constants for the wavetrope engine

/// Audio-related configuration
pub mod audio {
    /// Frames per progress notification block
    pub const BLOCK_SIZE: usize = 512;

    /// Upper bound for the gain stage (0.0..=MAX_GAIN)
    pub const MAX_GAIN: f32 = 2.0;

    /// Number of coefficients in one biquad section (b0, b1, b2, a1, a2)
    pub const BIQUAD_COEFFICIENTS: usize = 5;

    /// Minimum frames fed to the resampler per call
    pub const RESAMPLE_CHUNK: usize = 1024;
}

/// Waveform view configuration
pub mod view {
    /// Horizontal resolution used until the first zoom
    pub const DEFAULT_MIN_PX_PER_SEC: f64 = 20.0;

    /// Device pixel ratio when the host does not report one
    pub const DEFAULT_PIXEL_RATIO: f64 = 1.0;

    /// Widest wave laid out at any zoom level, in device pixels
    pub const MAX_RENDER_WIDTH: u32 = 1 << 20;
}

/// Timeline plugin configuration
pub mod timeline {
    /// Timeline height in CSS pixels
    pub const DEFAULT_HEIGHT: f64 = 20.0;

    /// Seconds between primary ticks
    pub const DEFAULT_PRIMARY_INTERVAL: f64 = 5.0;

    /// Label font size in CSS pixels
    pub const DEFAULT_FONT_SIZE: u32 = 10;

    /// Label font family
    pub const DEFAULT_FONT_FAMILY: &str = "Arial";

    /// Tick stroke width in pixels
    pub const DEFAULT_STRIDE_WIDTH: f64 = 1.0;

    /// Label baseline from the top of the surface
    pub const LABEL_BASELINE: f64 = 8.0;

    /// Offset of primary ticks from the top when drawn at the bottom
    pub const PRIMARY_TICK_OFFSET: f64 = 12.0;

    /// Length of secondary ticks when drawn at the bottom
    pub const SECONDARY_TICK_LENGTH: f64 = 3.0;

    /// Extra left shift applied to the last primary label so it is not clipped
    pub const LAST_LABEL_SHIFT: f64 = 10.0;
}

/// Network-related configuration
pub mod network {
    /// User agent for HTTP requests
    pub const USER_AGENT: &str = concat!("Wavetrope/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Read timeout in seconds
    pub const READ_TIMEOUT_SECS: u64 = 30;
}

/// Timeout configuration
pub mod timeouts {
    /// Maximum time a blocking decode may take, in seconds
    pub const DECODE_TIMEOUT_SECS: u64 = 30;
}
