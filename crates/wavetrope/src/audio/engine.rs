//! Playback engine
//!
//! Owns the decoded buffer, the shared gain stage and the handle of the one
//! running [`PlaybackSource`]. Sources are single-use, so every resume, seek
//! or buffer swap stops the active source and builds a new one at the
//! last-known position. The transport owns the source once it is built.

use std::sync::Arc;

use crate::bus::{EventBus, PlaybackSignal};
use crate::config::audio::BLOCK_SIZE;
use crate::error::{Result, WaveError};

use super::source::{GainStage, PlaybackSource, SourceHandle};
use super::transport::Transport;
use super::types::SampleBuffer;

const NO_BUFFER: &str = "no audio loaded";

/// Start/stop/seek/gain control over a single playback source at a time
pub struct PlaybackEngine {
    bus: Arc<EventBus>,
    transport: Box<dyn Transport>,
    gain: GainStage,
    buffer: Option<Arc<SampleBuffer>>,
    active: Option<SourceHandle>,
    /// Seconds at which the active source started, or the frozen position while paused
    start_position: f64,
    /// Optional stop point (seconds) of the active source
    end_position: Option<f64>,
    paused: bool,
    block_size: usize,
    next_id: u64,
    sources_built: u64,
}

impl PlaybackEngine {
    /// Create an engine that renders through `transport` and reports on `bus`
    pub fn new(transport: Box<dyn Transport>, bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            transport,
            gain: GainStage::default(),
            buffer: None,
            active: None,
            start_position: 0.0,
            end_position: None,
            paused: true,
            block_size: BLOCK_SIZE,
            next_id: 1,
            sources_built: 0,
        }
    }

    /// Frames between progress ticks (default [`BLOCK_SIZE`])
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer(&self) -> Option<&Arc<SampleBuffer>> {
        self.buffer.as_ref()
    }

    /// Load a fresh buffer: stop playback, reset the position to 0, paused
    pub fn set_buffer(&mut self, buffer: Arc<SampleBuffer>) {
        self.stop_active();
        self.buffer = Some(buffer);
        self.start_position = 0.0;
        self.end_position = None;
        self.paused = true;
    }

    /// Swap in a reprocessed buffer, keeping the position and play state
    pub fn replace_buffer(&mut self, buffer: Arc<SampleBuffer>) -> Result<()> {
        let position = self.current_time();
        let was_playing = self.is_playing();
        self.stop_active();

        let duration = buffer.duration();
        self.buffer = Some(buffer);
        self.start_position = position.min(duration);
        if was_playing {
            self.start_source(self.start_position, self.end_position)?;
        }
        Ok(())
    }

    /// Make `buffer` current and start playing it at `offset` seconds.
    ///
    /// Any running source is stopped first. Returns the new source id.
    pub fn build(&mut self, buffer: Arc<SampleBuffer>, offset: f64) -> Result<u64> {
        self.stop_active();
        self.buffer = Some(buffer);
        self.end_position = None;
        let offset = self.clamp_time(offset);
        self.start_source(offset, None)
    }

    /// Start playback from `start` (or the last-known position) up to `end`
    /// (or the end of the buffer). Restarts from 0 when at the end.
    pub fn play(&mut self, start: Option<f64>, end: Option<f64>) -> Result<u64> {
        let duration = self.require_buffer()?.duration();
        let start = match start {
            Some(t) => self.clamp_time(t),
            None => {
                let position = self.current_time();
                if position >= duration {
                    0.0
                } else {
                    position
                }
            }
        };
        let end = end
            .filter(|t| t.is_finite())
            .map(|t| t.clamp(start, duration));
        self.stop_active();
        self.start_source(start, end)
    }

    /// Stop the active source and freeze the position. Idempotent.
    pub fn pause(&mut self) -> Result<()> {
        self.require_buffer()?;
        if self.paused {
            return Ok(());
        }
        let position = self.current_time();
        self.stop_active();
        self.start_position = position;
        self.paused = true;
        Ok(())
    }

    /// Move the position to `time` seconds (clamped to the buffer).
    ///
    /// When playing, a new source is built at the target; when paused only
    /// the stored position moves.
    pub fn seek(&mut self, time: f64) -> Result<()> {
        self.require_buffer()?;
        let time = self.clamp_time(time);
        if self.is_playing() {
            let end = self.end_position.filter(|&end| end > time);
            self.stop_active();
            self.start_source(time, end)?;
        } else {
            self.start_position = time;
        }
        Ok(())
    }

    /// Handle a finished signal. Returns true if `source` was the active
    /// source, in which case the engine is now paused at the end point.
    pub fn reap_finished(&mut self, source: u64) -> bool {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|h| h.id() == source && h.is_finished());
        if !is_active {
            return false;
        }
        let position = self.current_time();
        self.active = None;
        self.start_position = position;
        self.end_position = None;
        self.paused = true;
        log::debug!("source {} finished at {:.3}s", source, position);
        true
    }

    /// Playback position in seconds
    pub fn current_time(&self) -> f64 {
        let Some(buffer) = self.buffer.as_ref() else {
            return 0.0;
        };
        match self.active.as_ref() {
            Some(handle) if !self.paused => {
                let elapsed = handle.frames_rendered() as f64 / buffer.sample_rate() as f64;
                let limit = self.end_position.unwrap_or_else(|| buffer.duration());
                (self.start_position + elapsed).min(limit)
            }
            _ => self.start_position,
        }
    }

    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration())
    }

    /// Position as a fraction of the duration, clamped to 0.0..=1.0
    pub fn played_percents(&self) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        (self.current_time() / duration).clamp(0.0, 1.0)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_playing(&self) -> bool {
        !self.paused && self.buffer.is_some()
    }

    /// Id of the running source, if any
    pub fn active_source(&self) -> Option<u64> {
        self.active.as_ref().map(SourceHandle::id)
    }

    /// Set gain (clamped to 0.0..=2.0), effective immediately
    pub fn set_gain(&self, gain: f32) {
        self.gain.set_gain(gain);
    }

    pub fn gain(&self) -> f32 {
        self.gain.gain()
    }

    pub fn set_muted(&self, muted: bool) {
        self.gain.set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.gain.is_muted()
    }

    /// Total number of sources built over the engine's lifetime
    pub fn sources_built(&self) -> u64 {
        self.sources_built
    }

    fn require_buffer(&self) -> Result<&Arc<SampleBuffer>> {
        self.buffer.as_ref().ok_or(WaveError::NotReady(NO_BUFFER))
    }

    fn clamp_time(&self, time: f64) -> f64 {
        if time.is_nan() {
            return 0.0;
        }
        time.clamp(0.0, self.duration())
    }

    fn start_source(&mut self, start: f64, end: Option<f64>) -> Result<u64> {
        let buffer = self.require_buffer()?.clone();
        let id = self.next_id;
        self.next_id += 1;

        let end_frame = end.map_or(buffer.len(), |t| buffer.frame_at(t));
        let source = PlaybackSource::new(
            id,
            buffer.clone(),
            buffer.frame_at(start),
            end_frame,
            self.gain.clone(),
            self.bus.clone(),
            self.block_size,
        );
        let handle = source.handle();
        self.transport.start(source)?;

        self.active = Some(handle);
        self.start_position = start;
        self.end_position = end;
        self.paused = false;
        self.sources_built += 1;
        self.bus.playback_state.emit(PlaybackSignal::Started { source: id });
        log::debug!("source {} started at {:.3}s", id, start);
        Ok(id)
    }

    fn stop_active(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop();
            self.transport.halt();
            self.bus
                .playback_state
                .emit(PlaybackSignal::Stopped { source: handle.id() });
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop_active();
    }
}
