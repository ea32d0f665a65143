//! Playback source
//!
//! `PlaybackSource` is a single-use `rodio::Source` over a shared
//! [`SampleBuffer`]. It plays one range of frames, multiplies every sample by
//! the shared [`GainStage`], and reports progress on the event bus. Once
//! stopped or finished it yields nothing; resuming means building a new one.

use std::num::NonZero;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rodio::Source;

use crate::bus::{EventBus, PlaybackSignal, ProgressTick};
use crate::config::audio::MAX_GAIN;

use super::types::SampleBuffer;

/// Shared gain and mute flag, read by every sample of every source
#[derive(Debug, Clone)]
pub struct GainStage {
    gain: Arc<AtomicU32>,
    muted: Arc<AtomicBool>,
}

impl Default for GainStage {
    fn default() -> Self {
        Self {
            gain: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            muted: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl GainStage {
    /// Set gain (clamped to 0.0..=MAX_GAIN, NaN treated as 0)
    pub fn set_gain(&self, gain: f32) {
        let gain = if gain.is_nan() { 0.0 } else { gain.clamp(0.0, MAX_GAIN) };
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Gain actually applied to samples
    pub fn effective(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            self.gain()
        }
    }
}

#[derive(Debug)]
struct HandleState {
    id: u64,
    stopped: AtomicBool,
    finished: AtomicBool,
    frames: AtomicU64,
}

/// Control and status handle for one [`PlaybackSource`]
#[derive(Debug, Clone)]
pub struct SourceHandle {
    state: Arc<HandleState>,
}

impl SourceHandle {
    fn new(id: u64) -> Self {
        Self {
            state: Arc::new(HandleState {
                id,
                stopped: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                frames: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Stop the source. It yields nothing from its next sample on.
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// True once the source reached the end of its range by itself
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.is_stopped() && !self.is_finished()
    }

    /// Frames rendered since the source started
    pub fn frames_rendered(&self) -> u64 {
        self.state.frames.load(Ordering::Relaxed)
    }
}

/// One-shot source over a range of a shared sample buffer
pub struct PlaybackSource {
    buffer: Arc<SampleBuffer>,
    handle: SourceHandle,
    gain: GainStage,
    bus: Arc<EventBus>,
    /// Next frame to render
    frame: usize,
    /// Frame at which playback stops (exclusive)
    end: usize,
    /// Channel of the next sample within the current frame
    channel: usize,
    block_size: usize,
    blocks: u64,
    channels: NonZero<u16>,
    sample_rate: NonZero<u32>,
}

impl PlaybackSource {
    /// Create a source playing `buffer` from frame `start` up to frame `end`.
    ///
    /// Both bounds are clamped to the buffer; an empty range finishes on the
    /// first sample request.
    pub fn new(
        id: u64,
        buffer: Arc<SampleBuffer>,
        start: usize,
        end: usize,
        gain: GainStage,
        bus: Arc<EventBus>,
        block_size: usize,
    ) -> Self {
        let len = buffer.len();
        let end = end.min(len);
        let start = start.min(end);
        let channels = u16::try_from(buffer.channel_count())
            .ok()
            .and_then(NonZero::new)
            .unwrap_or(NonZero::<u16>::MIN);
        let sample_rate = NonZero::new(buffer.sample_rate()).unwrap_or(NonZero::<u32>::MIN);
        Self {
            buffer,
            handle: SourceHandle::new(id),
            gain,
            bus,
            frame: start,
            end,
            channel: 0,
            block_size: block_size.max(1),
            blocks: 0,
            channels,
            sample_rate,
        }
    }

    /// Handle for stopping and observing this source
    pub fn handle(&self) -> SourceHandle {
        self.handle.clone()
    }

    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    fn finish(&mut self) {
        if !self.handle.state.finished.swap(true, Ordering::SeqCst) {
            self.bus.playback_state.emit(PlaybackSignal::Finished {
                source: self.handle.id(),
            });
        }
    }

    fn frame_done(&mut self) {
        self.frame += 1;
        let rendered = self.handle.state.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if rendered % self.block_size as u64 == 0 {
            self.blocks += 1;
            let duration = self.buffer.duration();
            let position = self.frame as f64 / self.buffer.sample_rate() as f64;
            let fraction = if duration > 0.0 {
                (position / duration).clamp(0.0, 1.0)
            } else {
                0.0
            };
            self.bus.progress_tick.emit(ProgressTick {
                source: self.handle.id(),
                block: self.blocks,
                position,
                fraction,
            });
        }
    }
}

impl Iterator for PlaybackSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.handle.is_stopped() || self.handle.is_finished() {
            return None;
        }
        if self.frame >= self.end {
            self.finish();
            return None;
        }

        let sample = self
            .buffer
            .channel(self.channel)
            .and_then(|c| c.get(self.frame))
            .copied()
            .unwrap_or(0.0);

        self.channel += 1;
        if self.channel >= self.buffer.channel_count() {
            self.channel = 0;
            self.frame_done();
        }

        Some(sample * self.gain.effective())
    }
}

impl Source for PlaybackSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> NonZero<u16> {
        self.channels
    }

    fn sample_rate(&self) -> NonZero<u32> {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        let frames = self.end.saturating_sub(self.frame);
        Some(Duration::from_secs_f64(
            frames as f64 / self.sample_rate.get() as f64,
        ))
    }
}
