//! Playback transports
//!
//! A transport consumes [`PlaybackSource`]s and pulls samples from them.
//! [`RodioTransport`] plays on the default output device from a dedicated
//! thread; [`ManualTransport`] renders on demand with no clock, for headless
//! hosts and tests.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use rodio::{DeviceSinkBuilder, Player};

use crate::error::{Result, WaveError};

use super::source::{PlaybackSource, SourceHandle};

/// Playback boundary: where built sources go to be rendered
pub trait Transport: Send {
    /// Take ownership of `source` and start rendering it
    fn start(&mut self, source: PlaybackSource) -> Result<()>;

    /// Drop whatever is queued on the output
    fn halt(&mut self);
}

enum OutputCommand {
    Start(PlaybackSource),
    Halt,
    Shutdown,
}

/// Transport backed by the default audio output device
pub struct RodioTransport {
    cmd_tx: Sender<OutputCommand>,
    thread: Option<JoinHandle<()>>,
}

impl RodioTransport {
    /// Open the default output device on a dedicated thread.
    ///
    /// Blocks until the output stream is initialized (or fails).
    pub fn new() -> Result<Self> {
        let (cmd_tx, cmd_rx) = bounded::<OutputCommand>(16);
        let (init_tx, init_rx) = bounded::<std::result::Result<(), String>>(1);

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || Self::run(cmd_rx, init_tx))
            .map_err(|e| WaveError::Audio(format!("Failed to spawn audio thread: {}", e)))?;

        let init_result = init_rx
            .recv()
            .map_err(|_| WaveError::Audio("Audio thread terminated during init".to_string()))?;
        init_result.map_err(WaveError::Audio)?;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    /// Graceful shutdown (consumes self)
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        let _ = self.cmd_tx.send(OutputCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn run(cmd_rx: Receiver<OutputCommand>, init_tx: Sender<std::result::Result<(), String>>) {
        // Output streams may be !Send, so they live and die on this thread
        let mut stream = match DeviceSinkBuilder::open_default_sink() {
            Ok(s) => s,
            Err(e) => {
                let _ = init_tx.send(Err(format!("Failed to open audio output: {}", e)));
                return;
            }
        };
        stream.log_on_drop(false);

        // `stream` must be declared before `player` so Rust drops player first
        let player = Player::connect_new(stream.mixer());
        let _ = init_tx.send(Ok(()));

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                OutputCommand::Start(source) => {
                    player.stop();
                    log::debug!("output: starting source {}", source.id());
                    player.append(source);
                    player.play();
                }
                OutputCommand::Halt => player.stop(),
                OutputCommand::Shutdown => break,
            }
        }
        player.stop();
    }
}

impl Transport for RodioTransport {
    fn start(&mut self, source: PlaybackSource) -> Result<()> {
        self.cmd_tx
            .send(OutputCommand::Start(source))
            .map_err(|_| WaveError::Audio("Audio output thread is gone".to_string()))
    }

    fn halt(&mut self) {
        let _ = self.cmd_tx.send(OutputCommand::Halt);
    }
}

impl Drop for RodioTransport {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[derive(Default)]
struct ManualState {
    active: Vec<PlaybackSource>,
    started: u64,
}

/// Clock-less transport that renders only when asked.
///
/// Cloning yields another handle onto the same output, so a host can keep
/// one clone for rendering after handing the other to a player.
#[derive(Clone, Default)]
pub struct ManualTransport {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull `frames` frames from every active source and return the mix,
    /// interleaved. Exhausted sources are dropped.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        let mut mix: Vec<f32> = Vec::new();
        for source in state.active.iter_mut() {
            let channels = rodio::Source::channels(source).get() as usize;
            let wanted = frames * channels;
            if mix.len() < wanted {
                mix.resize(wanted, 0.0);
            }
            for (slot, sample) in mix.iter_mut().zip(source.by_ref().take(wanted)) {
                *slot += sample;
            }
        }
        state.active.retain(|s| s.handle().is_running());
        mix
    }

    /// Render until no source is left running, in chunks of `frames`
    pub fn render_to_end(&self, frames: usize) -> usize {
        let mut rendered = 0;
        while self.has_active() {
            rendered += self.render(frames.max(1)).len();
        }
        rendered
    }

    /// Handles of sources that are still running
    pub fn running_sources(&self) -> Vec<SourceHandle> {
        self.state
            .lock()
            .map(|s| {
                s.active
                    .iter()
                    .map(|src| src.handle())
                    .filter(|h| h.is_running())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_active(&self) -> bool {
        !self.running_sources().is_empty()
    }

    /// Number of sources ever started on this transport
    pub fn started_count(&self) -> u64 {
        self.state.lock().map(|s| s.started).unwrap_or(0)
    }
}

impl Transport for ManualTransport {
    fn start(&mut self, source: PlaybackSource) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| WaveError::Audio("manual transport poisoned".to_string()))?;
        state.active.retain(|s| s.handle().is_running());
        state.active.push(source);
        state.started += 1;
        Ok(())
    }

    fn halt(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.active.clear();
        }
    }
}
