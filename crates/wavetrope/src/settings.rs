//! Player settings
//!
//! Host parameters for a player session, read from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::filter::FilterDescriptor;
use crate::config::audio::{BLOCK_SIZE, MAX_GAIN};
use crate::config::timeouts::DECODE_TIMEOUT_SECS;
use crate::config::view::{DEFAULT_MIN_PX_PER_SEC, DEFAULT_PIXEL_RATIO};
use crate::error::{Result, WaveError};
use crate::plugin::PluginSpec;

/// Settings file format version for migrations
const SETTINGS_VERSION: u32 = 1;

/// How `Player::set_volume` interacts with the mute flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutePolicy {
    /// Every volume change clears mute, so a zero volume never stays muted
    #[default]
    Legacy,
    /// Volume 0 mutes; any other volume unmutes
    Sticky,
}

/// Settings for one player session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSettings {
    /// File format version
    #[serde(default = "default_version")]
    pub version: u32,

    // === Audio ===
    /// Volume level (0.0 - 2.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Muted state
    #[serde(default)]
    pub muted: bool,

    #[serde(default)]
    pub mute_policy: MutePolicy,

    /// Frames between progress ticks
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Resample decoded audio to this rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sample_rate: Option<u32>,

    /// Seconds a blocking decode may take
    #[serde(default = "default_decode_timeout")]
    pub decode_timeout_secs: u64,

    // === Filters ===
    /// Filter applied when audio is first loaded
    #[serde(default, alias = "filterId", skip_serializing_if = "Option::is_none")]
    pub default_filter: Option<String>,

    #[serde(default)]
    pub filters: Vec<FilterDescriptor>,

    // === View ===
    /// Stretch short audio to the container
    #[serde(default = "default_true")]
    pub fill: bool,

    /// Scroll instead of squeezing long audio
    #[serde(default)]
    pub scroll: bool,

    #[serde(default = "default_min_px_per_sec")]
    pub min_px_per_sec: f64,

    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f64,

    // === Plugins ===
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_volume() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_block_size() -> usize {
    BLOCK_SIZE
}

fn default_decode_timeout() -> u64 {
    DECODE_TIMEOUT_SECS
}

fn default_min_px_per_sec() -> f64 {
    DEFAULT_MIN_PX_PER_SEC
}

fn default_pixel_ratio() -> f64 {
    DEFAULT_PIXEL_RATIO
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            volume: default_volume(),
            muted: false,
            mute_policy: MutePolicy::default(),
            block_size: BLOCK_SIZE,
            target_sample_rate: None,
            decode_timeout_secs: DECODE_TIMEOUT_SECS,
            default_filter: None,
            filters: Vec::new(),
            fill: true,
            scroll: false,
            min_px_per_sec: DEFAULT_MIN_PX_PER_SEC,
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            plugins: Vec::new(),
        }
    }
}

impl PlayerSettings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| WaveError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save settings to a JSON file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| WaveError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check ranges and that the default filter exists
    pub fn validate(&self) -> Result<()> {
        if !(self.volume.is_finite() && (0.0..=MAX_GAIN).contains(&self.volume)) {
            return Err(WaveError::Config(format!(
                "volume must be within 0.0..={}, got {}",
                MAX_GAIN, self.volume
            )));
        }
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(WaveError::Config(format!(
                "pixel ratio must be positive, got {}",
                self.pixel_ratio
            )));
        }
        if !(self.min_px_per_sec.is_finite() && self.min_px_per_sec > 0.0) {
            return Err(WaveError::Config(format!(
                "minPxPerSec must be positive, got {}",
                self.min_px_per_sec
            )));
        }
        if self.block_size == 0 {
            return Err(WaveError::Config("block size must be non-zero".to_string()));
        }
        if let Some(id) = &self.default_filter {
            if !self.filters.iter().any(|f| &f.id == id) {
                return Err(WaveError::FilterNotFound(id.clone()));
            }
        }
        Ok(())
    }
}
