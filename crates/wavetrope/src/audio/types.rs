//! Shared audio types
//!
//! Pure data types used across the audio subsystem.

use std::fmt;

use crate::error::{Result, WaveError};

/// Session state of a player, as observed by renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unready,
    Ready,
    Playing,
    Paused,
}

impl SessionState {
    /// True once audio has been decoded and the first filter applied
    pub fn is_loaded(self) -> bool {
        self != SessionState::Unready
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unready => write!(f, "unready"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Paused => write!(f, "paused"),
        }
    }
}

/// Codec information for the loaded audio
#[derive(Debug, Clone, PartialEq)]
pub struct CodecInfo {
    pub codec_name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: Option<u32>,
}

impl fmt::Display for CodecInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel_str = match self.channels {
            1 => "Mono".to_string(),
            2 => "Stereo".to_string(),
            n => format!("{n} ch"),
        };
        write!(f, "{} · {} Hz", self.codec_name, self.sample_rate)?;
        if let Some(bits) = self.bits_per_sample {
            write!(f, " · {}-bit", bits)?;
        }
        write!(f, " · {}", channel_str)
    }
}

/// Decoded PCM audio, planar and immutable.
///
/// Every channel holds the same number of frames. Filtering or resampling
/// produces a new buffer; a `SampleBuffer` is never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Build a buffer from per-channel sample vectors
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(WaveError::Decode("sample rate must be non-zero".to_string()));
        }
        let Some(first) = channels.first() else {
            return Err(WaveError::Decode("buffer has no channels".to_string()));
        };
        let frames = first.len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(WaveError::Decode(
                "channels have mismatched lengths".to_string(),
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Build a buffer from interleaved samples
    pub fn from_interleaved(sample_rate: u32, channel_count: u16, samples: &[f32]) -> Result<Self> {
        let count = channel_count as usize;
        if count == 0 {
            return Err(WaveError::Decode("buffer has no channels".to_string()));
        }
        let frames = samples.len() / count;
        let mut channels = vec![Vec::with_capacity(frames); count];
        for frame in samples.chunks_exact(count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of one channel, or `None` if out of range
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Frame index for a time offset, clamped to the buffer
    pub fn frame_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        ((seconds * self.sample_rate as f64).round() as usize).min(self.len())
    }

    /// New buffer with every channel mapped through `f`
    pub fn map_channels<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&[f32]) -> Vec<f32>,
    {
        let channels = self.channels.iter().map(|c| f(c)).collect();
        Self::new(self.sample_rate, channels)
    }
}
