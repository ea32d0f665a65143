//! Audio subsystem
//!
//! Handles decoding, filtering, and sample-accurate playback.
//!

pub mod decoder;
pub mod engine;
pub mod filter;
pub mod source;
pub mod transport;
pub mod types;

pub use decoder::{DecodeBackend, DecodeOptions, Decoded, PcmDecoder, PendingDecode, SymphoniaBackend};
pub use engine::PlaybackEngine;
pub use filter::{apply_filter, FilterBank, FilterDescriptor};
pub use source::{GainStage, PlaybackSource, SourceHandle};
pub use transport::{ManualTransport, RodioTransport, Transport};
pub use types::{CodecInfo, SampleBuffer, SessionState};
