//! Wavetrope — Audio Playback and Waveform Engine
//!
//! Decoding, filtering, sample-accurate playback, waveform peaks and a
//! timeline ruler, tied together by a [`player::Player`] session.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wavetrope::bus::EventBus;
//! use wavetrope::player::{Host, Player};
//! use wavetrope::settings::PlayerSettings;
//! use wavetrope::wave::NullRenderer;
//!
//! # fn main() -> wavetrope::error::Result<()> {
//! let host = Host::with_default_output(Box::new(NullRenderer::new(800)))?;
//! let mut player = Player::new(PlayerSettings::default(), host, Arc::new(EventBus::new()))?;
//! player.load("https://example.com/track.wav")?;
//! player.play()?;
//! player.poll()?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod bus;
pub mod config;
pub mod error;
pub mod fetch;
pub mod player;
pub mod plugin;
pub mod settings;
pub mod wave;

pub use error::{Result, WaveError};
pub use player::{Host, Player, SessionStats};
