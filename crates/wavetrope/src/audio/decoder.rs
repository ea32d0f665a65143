//! PCM decoder using Symphonia
//!
//! Decodes a complete in-memory audio file into a planar [`SampleBuffer`].
//! Decodes run on a background `"pcm-decode"` thread; each new decode
//! supersedes (and cancels) the previous one, and callers check
//! [`PendingDecode::is_current`] before applying a result.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer as ScratchBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::audio::RESAMPLE_CHUNK;
use crate::config::timeouts::DECODE_TIMEOUT_SECS;
use crate::error::{Result, WaveError};

use super::types::{CodecInfo, SampleBuffer};

/// Convert a symphonia codec type to a human-readable name
pub fn codec_type_to_name(codec: symphonia::core::codecs::CodecType) -> String {
    use symphonia::core::codecs::*;
    match codec {
        CODEC_TYPE_AAC => "AAC".to_string(),
        CODEC_TYPE_FLAC => "FLAC".to_string(),
        CODEC_TYPE_MP3 => "MP3".to_string(),
        CODEC_TYPE_OPUS => "Opus".to_string(),
        CODEC_TYPE_VORBIS => "Vorbis".to_string(),
        CODEC_TYPE_PCM_U8 => "PCM 8-bit".to_string(),
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM 16-bit".to_string(),
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM 24-bit".to_string(),
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM 32-bit".to_string(),
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM 32-bit Float".to_string(),
        CODEC_TYPE_PCM_F64LE | CODEC_TYPE_PCM_F64BE => "PCM 64-bit Float".to_string(),
        CODEC_TYPE_PCM_ALAW => "PCM A-law".to_string(),
        CODEC_TYPE_PCM_MULAW => "PCM u-law".to_string(),
        CODEC_TYPE_ALAC => "ALAC".to_string(),
        _ => "Audio".to_string(),
    }
}

/// Options applied to every decode
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeOptions {
    /// Resample to this rate when it differs from the native rate
    pub target_sample_rate: Option<u32>,
}

/// Result of decoding one audio file
#[derive(Debug, Clone)]
pub struct Decoded {
    pub buffer: SampleBuffer,
    pub codec: CodecInfo,
    /// Packets decoded successfully
    pub packets: u64,
    /// Corrupt packets skipped
    pub skipped_packets: u64,
}

/// Host decode capability: raw bytes in, PCM out
pub trait DecodeBackend: Send + Sync {
    /// Decode `bytes` completely. Implementations should poll `cancel`
    /// between packets and bail out once it is set.
    fn decode(&self, bytes: &[u8], options: &DecodeOptions, cancel: &AtomicBool)
        -> Result<Decoded>;
}

/// Decode backend built on symphonia's default probe and codec registry
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaBackend;

impl DecodeBackend for SymphoniaBackend {
    fn decode(
        &self,
        bytes: &[u8],
        options: &DecodeOptions,
        cancel: &AtomicBool,
    ) -> Result<Decoded> {
        if bytes.is_empty() {
            return Err(WaveError::Decode("empty input".to_string()));
        }

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| WaveError::Decode(format!("Probe error: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| WaveError::Decode("No audio track found".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| WaveError::Decode(format!("Decoder creation error: {}", e)))?;

        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channel_count = codec_params.channels.map(|c| c.count()).unwrap_or(0);
        let mut interleaved: Vec<f32> = Vec::new();
        let mut scratch: Option<ScratchBuffer<f32>> = None;
        let mut packets = 0u64;
        let mut skipped_packets = 0u64;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(WaveError::Decode("decode cancelled".to_string()));
            }
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(WaveError::Decode(format!("Read error: {}", e))),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    packets += 1;
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity() as u64;
                    sample_rate = spec.rate;
                    channel_count = spec.channels.count();

                    let needs_alloc = scratch
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < capacity as usize);
                    if needs_alloc {
                        scratch = Some(ScratchBuffer::new(capacity, spec));
                    }
                    if let Some(ref mut buf) = scratch {
                        buf.copy_interleaved_ref(decoded);
                        interleaved.extend_from_slice(buf.samples());
                    }
                }
                Err(SymphoniaError::DecodeError(_)) => {
                    skipped_packets += 1;
                    continue;
                }
                Err(e) => return Err(WaveError::Decode(format!("{}", e))),
            }
        }

        if packets == 0 || interleaved.is_empty() {
            return Err(WaveError::Decode("no audio frames decoded".to_string()));
        }
        if channel_count == 0 || sample_rate == 0 {
            return Err(WaveError::Decode("unknown channel layout".to_string()));
        }
        let frames = (interleaved.len() / channel_count) as u64;
        if let Some(expected) = codec_params.n_frames {
            if frames < expected {
                return Err(WaveError::Decode(format!(
                    "truncated stream: {} of {} frames",
                    frames, expected
                )));
            }
        }

        let mut buffer = SampleBuffer::from_interleaved(sample_rate, channel_count as u16, &interleaved)?;
        if let Some(target) = options.target_sample_rate {
            if target != 0 && target != sample_rate {
                buffer = resample(&buffer, target)?;
            }
        }

        let codec = CodecInfo {
            codec_name: codec_type_to_name(codec_params.codec),
            channels: channel_count as u16,
            sample_rate: buffer.sample_rate(),
            bits_per_sample: codec_params.bits_per_sample,
        };

        Ok(Decoded {
            buffer,
            codec,
            packets,
            skipped_packets,
        })
    }
}

/// Resample every channel of `buffer` to `to_rate` with a windowed sinc filter
pub fn resample(buffer: &SampleBuffer, to_rate: u32) -> Result<SampleBuffer> {
    let from_rate = buffer.sample_rate();
    if from_rate == to_rate || buffer.is_empty() {
        return Ok(buffer.clone());
    }
    if to_rate == 0 {
        return Err(WaveError::Decode("cannot resample to 0 Hz".to_string()));
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (buffer.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let chunk = buffer.len().max(RESAMPLE_CHUNK);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk, buffer.channel_count())
        .map_err(|e| WaveError::Decode(format!("resampler setup failed: {}", e)))?;

    // Output starts `output_delay` frames late; keep flushing until the tail is out
    let delay = resampler.output_delay();
    let input: Vec<&[f32]> = buffer.channels().collect();
    let mut out = resampler
        .process_partial(Some(input.as_slice()), None)
        .map_err(|e| WaveError::Decode(format!("resample failed: {}", e)))?;
    while out.first().map_or(0, Vec::len) < delay + new_len {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| WaveError::Decode(format!("resample failed: {}", e)))?;
        if tail.first().map_or(true, Vec::is_empty) {
            break;
        }
        for (channel, more) in out.iter_mut().zip(tail) {
            channel.extend(more);
        }
    }

    let channels = out
        .into_iter()
        .map(|channel| {
            let mut trimmed: Vec<f32> = channel.into_iter().skip(delay).take(new_len).collect();
            trimmed.resize(new_len, 0.0);
            trimmed
        })
        .collect();
    SampleBuffer::new(to_rate, channels)
}

/// A decode running on a background thread
pub struct PendingDecode {
    generation: u64,
    latest: Arc<AtomicU64>,
    cancel: Arc<AtomicBool>,
    rx: Receiver<Result<Decoded>>,
    started: Instant,
}

impl PendingDecode {
    /// Generation number assigned when the decode started
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once a newer decode has been started
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }

    /// Time since the decode was started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Ask the decode thread to stop early
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Non-blocking poll. `None` while the decode is still running.
    pub fn try_take(&self) -> Option<Result<Decoded>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(WaveError::Decode(
                "Decode thread panicked".to_string(),
            ))),
        }
    }

    /// Block until the decode finishes or `timeout` elapses
    pub fn wait(self, timeout: Duration) -> Result<Decoded> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.cancel();
                Err(WaveError::Timeout(format!(
                    "Decode timed out after {}s",
                    timeout.as_secs()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(WaveError::Decode("Decode thread panicked".to_string()))
            }
        }
    }
}

/// Front end for a [`DecodeBackend`] that tracks decode generations
pub struct PcmDecoder {
    backend: Arc<dyn DecodeBackend>,
    options: DecodeOptions,
    latest: Arc<AtomicU64>,
    inflight: Option<Arc<AtomicBool>>,
    timeout: Duration,
}

impl Default for PcmDecoder {
    fn default() -> Self {
        Self::new(Arc::new(SymphoniaBackend), DecodeOptions::default())
    }
}

impl PcmDecoder {
    /// Create a decoder around the given backend
    pub fn new(backend: Arc<dyn DecodeBackend>, options: DecodeOptions) -> Self {
        Self {
            backend,
            options,
            latest: Arc::new(AtomicU64::new(0)),
            inflight: None,
            timeout: Duration::from_secs(DECODE_TIMEOUT_SECS),
        }
    }

    /// Override the blocking decode timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Generation of the most recently started decode (0 before any)
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Start decoding on a background thread and return immediately.
    ///
    /// Any decode still in flight is cancelled and becomes stale.
    pub fn start(&mut self, bytes: Vec<u8>) -> Result<PendingDecode> {
        if let Some(previous) = self.inflight.take() {
            previous.store(true, Ordering::SeqCst);
        }
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = Arc::new(AtomicBool::new(false));
        self.inflight = Some(cancel.clone());

        let backend = self.backend.clone();
        let options = self.options;
        let cancel_thread = cancel.clone();
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::Builder::new()
            .name("pcm-decode".to_string())
            .spawn(move || {
                let result = backend.decode(&bytes, &options, &cancel_thread);
                let _ = tx.send(result);
            })
            .map_err(|e| WaveError::Audio(format!("Failed to spawn decode thread: {}", e)))?;

        log::debug!("decode generation {} started", generation);
        Ok(PendingDecode {
            generation,
            latest: self.latest.clone(),
            cancel,
            rx,
            started: Instant::now(),
        })
    }

    /// Decode and block for the result, up to the configured timeout
    pub fn decode(&mut self, bytes: Vec<u8>) -> Result<Decoded> {
        let timeout = self.timeout;
        self.start(bytes)?.wait(timeout)
    }
}
