//! Player session
//!
//! `Player` ties the pieces together: it fetches and decodes audio, applies
//! the selected filter, drives the [`PlaybackEngine`], lays out and draws the
//! waveform, and keeps the session state on the event bus. It is driven from
//! a single control thread; decode and device output run on helper threads
//! and their results are applied in [`Player::poll`].

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::audio::decoder::{DecodeBackend, DecodeOptions, Decoded, PcmDecoder, PendingDecode, SymphoniaBackend};
use crate::audio::engine::PlaybackEngine;
use crate::audio::filter::{apply_filter, FilterBank};
use crate::audio::transport::{RodioTransport, Transport};
use crate::audio::types::{CodecInfo, SampleBuffer, SessionState};
use crate::bus::{ControlEvent, EventBus, Interaction, InteractionKind, PlaybackSignal, ProgressTick};
use crate::config::audio::MAX_GAIN;
use crate::error::{Result, WaveError};
use crate::fetch::{Fetch, HttpFetcher};
use crate::plugin::{PluginFactory, PluginHost, PluginRegistry};
use crate::settings::{MutePolicy, PlayerSettings};
use crate::wave::peaks::compute_peaks;
use crate::wave::renderer::{WaveFrame, WaveRenderer};
use crate::wave::view::{draw_layout, ViewSnapshot, ZoomState};

const NOT_LOADED: &str = "no audio loaded";

/// Host collaborators a player is built around
pub struct Host {
    pub transport: Box<dyn Transport>,
    pub renderer: Box<dyn WaveRenderer>,
    /// Created on first `load(url)` when not supplied
    pub fetcher: Option<Box<dyn Fetch>>,
    pub backend: Arc<dyn DecodeBackend>,
}

impl Host {
    pub fn new(transport: Box<dyn Transport>, renderer: Box<dyn WaveRenderer>) -> Self {
        Self {
            transport,
            renderer,
            fetcher: None,
            backend: Arc::new(SymphoniaBackend),
        }
    }

    /// Host playing through the default output device
    pub fn with_default_output(renderer: Box<dyn WaveRenderer>) -> Result<Self> {
        Ok(Self::new(Box::new(RodioTransport::new()?), renderer))
    }

    pub fn fetcher(mut self, fetcher: Box<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn DecodeBackend>) -> Self {
        self.backend = backend;
        self
    }
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Decodes whose result was applied
    pub decodes_completed: u64,
    /// Decodes superseded before their result was applied
    pub decodes_discarded: u64,
    /// Filter switches that reprocessed the buffer
    pub refilters: u64,
    /// Waveform draws
    pub draws: u64,
    /// Playback sources built
    pub sources_built: u64,
}

/// One audio playback and waveform session.
///
/// The player subscribes to progress and playback signals when it is built
/// and only drains them in [`poll`](Player::poll). Hosts must call `poll`
/// regularly (every frame or timer tick) while a session is alive, or those
/// queues grow for as long as audio plays.
pub struct Player {
    settings: PlayerSettings,
    bus: Arc<EventBus>,
    engine: PlaybackEngine,
    decoder: PcmDecoder,
    pending: Option<PendingDecode>,
    renderer: Box<dyn WaveRenderer>,
    fetcher: Option<Box<dyn Fetch>>,
    filters: FilterBank,
    /// Unfiltered decode result, the input of every filter switch
    clean: Option<Arc<SampleBuffer>>,
    selected_filter: Option<String>,
    codec: Option<CodecInfo>,
    state: SessionState,
    zoom: ZoomState,
    pixel_ratio: f64,
    view: ViewSnapshot,
    saved_volume: f32,
    muted: bool,
    registry: PluginRegistry,
    plugins: PluginHost,
    plugins_spawned: bool,
    signal_rx: Receiver<PlaybackSignal>,
    tick_rx: Receiver<ProgressTick>,
    interaction_rx: Receiver<Interaction>,
    last_tick: Option<ProgressTick>,
    stats: SessionStats,
}

impl Player {
    /// Create a player. Nothing is loaded; the session starts `Unready`.
    pub fn new(settings: PlayerSettings, host: Host, bus: Arc<EventBus>) -> Result<Self> {
        settings.validate()?;
        let filters = FilterBank::new(settings.filters.clone())?;
        let engine = PlaybackEngine::new(host.transport, bus.clone()).with_block_size(settings.block_size);
        let decoder = PcmDecoder::new(
            host.backend,
            DecodeOptions {
                target_sample_rate: settings.target_sample_rate,
            },
        )
        .with_timeout(Duration::from_secs(settings.decode_timeout_secs));

        engine.set_gain(settings.volume);
        engine.set_muted(settings.muted);

        let zoom = ZoomState {
            min_px_per_sec: settings.min_px_per_sec,
            scroll: settings.scroll,
            auto_center: settings.scroll,
            fill: settings.fill,
        };
        let view = ViewSnapshot {
            pixel_ratio: settings.pixel_ratio,
            min_px_per_sec: zoom.min_px_per_sec,
            fill: zoom.fill,
            scroll: zoom.scroll,
            auto_center: zoom.auto_center,
            ..ViewSnapshot::default()
        };

        Ok(Self {
            signal_rx: bus.playback_state.subscribe(),
            tick_rx: bus.progress_tick.subscribe(),
            interaction_rx: bus.renderer_interaction.subscribe(),
            plugins: PluginHost::new(&bus),
            pixel_ratio: settings.pixel_ratio,
            saved_volume: settings.volume,
            muted: settings.muted,
            bus,
            engine,
            decoder,
            pending: None,
            renderer: host.renderer,
            fetcher: host.fetcher,
            filters,
            clean: None,
            selected_filter: None,
            codec: None,
            state: SessionState::Unready,
            zoom,
            view,
            registry: PluginRegistry::new(),
            plugins_spawned: false,
            last_tick: None,
            stats: SessionStats::default(),
            settings,
        })
    }

    /// Register a renderer plugin kind. Plugins listed in the settings are
    /// created the first time the session becomes ready.
    pub fn register_plugin(&mut self, kind: impl Into<String>, factory: PluginFactory) {
        self.registry.register(kind, factory);
    }

    // === Loading ===

    /// Fetch `url` and load it, blocking until decoded
    pub fn load(&mut self, url: &str) -> Result<()> {
        if self.fetcher.is_none() {
            self.fetcher = Some(Box::new(HttpFetcher::new()?));
        }
        let bytes = match self.fetcher.as_ref() {
            Some(fetcher) => fetcher.fetch(url)?,
            None => return Err(WaveError::Fetch(format!("no fetcher for {}", url))),
        };
        log::info!("loading {} ({} bytes)", url, bytes.len());
        self.load_bytes(bytes)
    }

    /// Decode `bytes` and load the result, blocking until done.
    ///
    /// On failure the session is left exactly as it was.
    pub fn load_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        if self.pending.take().is_some() {
            self.stats.decodes_discarded += 1;
        }
        let decoded = self.decoder.decode(bytes)?;
        self.apply_decoded(decoded)
    }

    /// Start decoding `bytes` in the background and return its generation.
    ///
    /// The result is applied by a later [`poll`](Self::poll). Starting
    /// another load supersedes this one.
    pub fn begin_load_bytes(&mut self, bytes: Vec<u8>) -> Result<u64> {
        let pending = self.decoder.start(bytes)?;
        let generation = pending.generation();
        if self.pending.replace(pending).is_some() {
            self.stats.decodes_discarded += 1;
        }
        Ok(generation)
    }

    /// True while a background decode is outstanding
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    fn apply_decoded(&mut self, decoded: Decoded) -> Result<()> {
        let clean = Arc::new(decoded.buffer);
        let filtered = match self.settings.default_filter.as_deref() {
            Some(id) => Arc::new(apply_filter(&clean, self.filters.get(id)?)?),
            None => clean.clone(),
        };

        self.engine.set_buffer(filtered);
        self.clean = Some(clean);
        self.selected_filter = self.settings.default_filter.clone();
        self.codec = Some(decoded.codec);
        self.last_tick = None;
        self.stats.decodes_completed += 1;
        if decoded.skipped_packets > 0 {
            log::warn!("skipped {} corrupt packets", decoded.skipped_packets);
        }
        log::info!(
            "loaded {:.2}s of audio ({})",
            self.engine.duration(),
            self.codec.as_ref().map(|c| c.to_string()).unwrap_or_default()
        );

        self.state = SessionState::Ready;
        self.bus.session_state.emit(SessionState::Ready);

        self.refresh_view();
        if !self.plugins_spawned {
            self.plugins_spawned = true;
            let started = self.plugins.spawn(&self.registry, &self.settings.plugins, &self.view);
            log::debug!("{} plugins started", started);
        }
        self.draw_buffer()
    }

    // === Filters ===

    /// Switch to filter `id`.
    ///
    /// Unknown ids fail without touching the session; selecting the current
    /// filter again does nothing. Playback is paused, never resumed.
    pub fn change_filter(&mut self, id: &str) -> Result<()> {
        let filter = self.filters.get(id)?.clone();
        if self.selected_filter.as_deref() == Some(id) {
            return Ok(());
        }
        let clean = self.clean.clone().ok_or(WaveError::NotReady(NOT_LOADED))?;

        if self.state == SessionState::Playing {
            self.pause()?;
        }
        let filtered = apply_filter(&clean, &filter)?;
        self.engine.replace_buffer(Arc::new(filtered))?;
        self.selected_filter = Some(filter.id);
        self.stats.refilters += 1;
        log::info!("filter changed to {}", id);
        self.draw_buffer()
    }

    // === Transport ===

    /// Start or resume playback, restoring the saved volume first
    pub fn play(&mut self) -> Result<()> {
        self.start_playback(None, None)
    }

    /// Play from `start` to `end` seconds
    pub fn play_range(&mut self, start: f64, end: f64) -> Result<()> {
        self.start_playback(Some(start), Some(end))
    }

    fn start_playback(&mut self, start: Option<f64>, end: Option<f64>) -> Result<()> {
        self.require_loaded()?;
        self.engine.set_muted(self.muted);
        self.engine.set_gain(self.saved_volume);
        self.engine.play(start, end)?;
        self.set_state(SessionState::Playing);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.require_loaded()?;
        if self.engine.is_paused() {
            return Ok(());
        }
        self.engine.pause()?;
        self.set_state(SessionState::Paused);
        Ok(())
    }

    /// Toggle between playing and paused
    pub fn play_pause(&mut self) -> Result<()> {
        if self.engine.is_paused() {
            self.play()
        } else {
            self.pause()
        }
    }

    /// Seek to `fraction` (0.0..=1.0) of the duration, keeping the play state
    pub fn seek_to(&mut self, fraction: f64) -> Result<()> {
        self.require_loaded()?;
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        let target = fraction * self.engine.duration();

        let was_playing = self.engine.is_playing();
        if was_playing {
            self.engine.pause()?;
        }
        let old_scroll = self.zoom.scroll;
        self.zoom.scroll = false;

        let result = self.seek_inner(target, fraction, was_playing);
        self.zoom.scroll = old_scroll;
        self.view.scroll = old_scroll;
        result
    }

    fn seek_inner(&mut self, target: f64, fraction: f64, resume: bool) -> Result<()> {
        self.engine.seek(target)?;
        let mut view = self.view.clone();
        view.scroll = self.zoom.scroll;
        self.renderer.render_progress(fraction, &view);
        if resume {
            self.engine.play(Some(target), None)?;
        }
        Ok(())
    }

    // === Volume ===

    /// Set the playback volume (0.0..=2.0); mute follows the mute policy
    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, MAX_GAIN) };
        self.saved_volume = volume;
        self.muted = match self.settings.mute_policy {
            MutePolicy::Legacy => false,
            MutePolicy::Sticky => volume == 0.0,
        };
        self.engine.set_gain(volume);
        self.engine.set_muted(self.muted);
    }

    /// Gain currently applied by the engine
    pub fn volume(&self) -> f32 {
        self.engine.gain()
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.engine.set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    // === View ===

    /// Change the zoom level.
    ///
    /// `level` <= 0 (or not finite) turns scroll and auto-center off and
    /// keeps the current resolution; otherwise it sets the pixels per second
    /// and turns both on. Dependent renderers are told through the bus.
    pub fn zoom(&mut self, level: f64) {
        if level.is_finite() && level > 0.0 {
            self.zoom.min_px_per_sec = level;
            self.zoom.scroll = true;
            self.zoom.auto_center = true;
        } else {
            self.zoom.scroll = false;
            self.zoom.auto_center = false;
        }

        if self.state.is_loaded() {
            if let Err(e) = self.draw_buffer() {
                log::warn!("redraw after zoom failed: {}", e);
            }
            self.renderer
                .render_progress(self.engine.played_percents(), &self.view);
        } else {
            self.refresh_view();
        }
        self.bus.external_control.emit(ControlEvent::Zoom {
            scroll: self.zoom.scroll,
            view: self.view.clone(),
        });
    }

    /// Lay out the loaded buffer for the renderer's container and draw it
    pub fn draw_buffer(&mut self) -> Result<()> {
        let buffer = self
            .engine
            .buffer()
            .cloned()
            .ok_or(WaveError::NotReady(NOT_LOADED))?;
        self.refresh_view();

        let peaks = compute_peaks(&buffer, self.view.width as usize, 0, buffer.len());
        self.renderer.draw_wave(&WaveFrame {
            peaks: &peaks,
            width: self.view.width,
            start: 0,
            end: self.view.width,
        });
        self.stats.draws += 1;
        Ok(())
    }

    fn refresh_view(&mut self) {
        let container = self.renderer.container_width();
        let duration = self.engine.duration();
        let layout = draw_layout(duration, &self.zoom, self.pixel_ratio, container);
        self.view = ViewSnapshot::new(duration, &self.zoom, self.pixel_ratio, &layout, container);
    }

    // === Event pump ===

    /// Apply everything that happened off the control thread.
    ///
    /// Finishes a background decode, turns a natural end of playback into
    /// `Paused`, redraws progress from the newest tick, seeks on renderer
    /// clicks and forwards control events to plugins. Returns the error of a
    /// failed background decode.
    pub fn poll(&mut self) -> Result<()> {
        let mut outcome = Ok(());

        if let Some(result) = self.pending.as_ref().and_then(PendingDecode::try_take) {
            if let Some(pending) = self.pending.take() {
                if !pending.is_current() {
                    self.stats.decodes_discarded += 1;
                    log::debug!("dropping stale decode generation {}", pending.generation());
                } else {
                    outcome = result.and_then(|decoded| self.apply_decoded(decoded));
                }
            }
        }

        while let Ok(signal) = self.signal_rx.try_recv() {
            if let PlaybackSignal::Finished { source } = signal {
                if self.engine.reap_finished(source) {
                    self.set_state(SessionState::Paused);
                    self.renderer
                        .render_progress(self.engine.played_percents(), &self.view);
                }
            }
        }

        let active = self.engine.active_source();
        if let Some(tick) = self
            .tick_rx
            .try_iter()
            .filter(|t| Some(t.source) == active)
            .last()
        {
            self.last_tick = Some(tick);
            self.renderer
                .render_progress(self.engine.played_percents(), &self.view);
        }

        while let Ok(interaction) = self.interaction_rx.try_recv() {
            match interaction.kind {
                InteractionKind::Click => {
                    if let Err(e) = self.seek_to(interaction.progress) {
                        log::debug!("ignoring click: {}", e);
                    }
                }
                InteractionKind::DoubleClick => {}
            }
        }

        self.plugins.dispatch();
        outcome
    }

    /// Subscribe to playback progress ticks
    pub fn progress_receiver(&self) -> Receiver<ProgressTick> {
        self.bus.progress_tick.subscribe()
    }

    /// Most recent progress tick from the active source seen by `poll`
    pub fn last_tick(&self) -> Option<ProgressTick> {
        self.last_tick
    }

    // === Reads ===

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    pub fn duration(&self) -> f64 {
        self.engine.duration()
    }

    pub fn played_percents(&self) -> f64 {
        self.engine.played_percents()
    }

    pub fn is_paused(&self) -> bool {
        self.engine.is_paused()
    }

    pub fn selected_filter(&self) -> Option<&str> {
        self.selected_filter.as_deref()
    }

    pub fn zoom_state(&self) -> ZoomState {
        self.zoom
    }

    /// Layout of the last draw
    pub fn view(&self) -> &ViewSnapshot {
        &self.view
    }

    pub fn codec_info(&self) -> Option<&CodecInfo> {
        self.codec.as_ref()
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    /// Number of live renderer plugins
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            sources_built: self.engine.sources_built(),
            ..self.stats
        }
    }

    fn require_loaded(&self) -> Result<()> {
        if self.state.is_loaded() {
            Ok(())
        } else {
            Err(WaveError::NotReady(NOT_LOADED))
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("session {} -> {}", self.state, state);
            self.state = state;
            self.bus.session_state.emit(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::tests::make_wav;
    use crate::audio::filter::FilterDescriptor;
    use crate::audio::transport::ManualTransport;
    use crate::config::view::MAX_RENDER_WIDTH;
    use crate::fetch::MemoryFetcher;
    use crate::plugin::PluginSpec;
    use crate::wave::peaks::PeakSet;
    use crate::wave::timeline::tests::RecordingSurface;
    use crate::wave::timeline::{TimelinePlugin, TimelineSurface, TIMELINE_KIND};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug, Default)]
    struct Drawn {
        waves: Vec<(u32, usize)>,
        progress: Vec<(f64, bool)>,
    }

    /// Renderer that records draws
    struct RecordingRenderer {
        width: u32,
        drawn: Arc<Mutex<Drawn>>,
    }

    impl WaveRenderer for RecordingRenderer {
        fn container_width(&self) -> u32 {
            self.width
        }

        fn draw_wave(&mut self, frame: &WaveFrame<'_>) {
            let peaks: &PeakSet = frame.peaks;
            self.drawn.lock().unwrap().waves.push((frame.width, peaks.len()));
        }

        fn render_progress(&mut self, progress: f64, view: &ViewSnapshot) {
            self.drawn.lock().unwrap().progress.push((progress, view.scroll));
        }
    }

    struct Harness {
        player: Player,
        transport: ManualTransport,
        bus: Arc<EventBus>,
        drawn: Arc<Mutex<Drawn>>,
    }

    const RATE: u32 = 44100;

    /// Mono WAV of `seconds` seconds with a gentle ramp
    fn wav(seconds: usize) -> Vec<u8> {
        let samples: Vec<i16> = (0..seconds * RATE as usize)
            .map(|i| ((i % 1000) as i16 - 500) * 20)
            .collect();
        make_wav(RATE, 1, &samples)
    }

    fn half_filter() -> FilterDescriptor {
        FilterDescriptor::new("half", vec![0.5, 0.0, 0.0, 0.0, 0.0])
    }

    fn settings() -> PlayerSettings {
        PlayerSettings {
            filters: vec![FilterDescriptor::identity("flat"), half_filter()],
            default_filter: Some("flat".to_string()),
            ..PlayerSettings::default()
        }
    }

    fn harness_with(settings: PlayerSettings) -> Harness {
        let transport = ManualTransport::new();
        let drawn = Arc::new(Mutex::new(Drawn::default()));
        let renderer = RecordingRenderer {
            width: 800,
            drawn: drawn.clone(),
        };
        let bus = Arc::new(EventBus::new());
        let host = Host::new(Box::new(transport.clone()), Box::new(renderer))
            .fetcher(Box::new(MemoryFetcher::new().with("mem://ten.wav", wav(10))));
        let player = Player::new(settings, host, bus.clone()).unwrap();
        Harness {
            player,
            transport,
            bus,
            drawn,
        }
    }

    fn harness() -> Harness {
        harness_with(settings())
    }

    fn loaded() -> Harness {
        let mut h = harness();
        h.player.load("mem://ten.wav").unwrap();
        h
    }

    // --- End to end ---

    #[test]
    fn ten_second_session() {
        let mut h = harness();
        let states = h.bus.session_state.subscribe();

        h.player.load("mem://ten.wav").unwrap();
        assert!((h.player.duration() - 10.0).abs() < 1e-3);
        assert_eq!(h.player.state(), SessionState::Ready);

        h.player.play().unwrap();
        h.transport.render(h.player.settings().block_size);
        h.player.poll().unwrap();
        assert!(h.player.current_time() > 0.0);
        assert!(h.player.last_tick().is_some());

        h.player.pause().unwrap();
        h.player.seek_to(0.5).unwrap();
        assert!((h.player.current_time() - 5.0).abs() < 1e-3);

        let got: Vec<_> = states.try_iter().collect();
        assert_eq!(
            got,
            vec![SessionState::Ready, SessionState::Playing, SessionState::Paused]
        );
    }

    // --- Loading ---

    #[test]
    fn operations_before_load_are_not_ready() {
        let mut h = harness();
        assert!(h.player.play().unwrap_err().is_not_ready());
        assert!(h.player.pause().unwrap_err().is_not_ready());
        assert!(h.player.seek_to(0.5).unwrap_err().is_not_ready());
        assert!(h.player.draw_buffer().unwrap_err().is_not_ready());
        assert!(h.player.change_filter("half").unwrap_err().is_not_ready());
        assert_eq!(h.player.state(), SessionState::Unready);
    }

    #[test]
    fn failed_decode_publishes_nothing() {
        let mut h = harness();
        let states = h.bus.session_state.subscribe();

        let err = h.player.load_bytes(vec![0u8; 256]).unwrap_err();
        assert!(matches!(err, WaveError::Decode(_)));
        assert_eq!(h.player.state(), SessionState::Unready);
        assert!(states.try_recv().is_err());
        assert!(h.drawn.lock().unwrap().waves.is_empty());
    }

    #[test]
    fn truncated_download_stays_unready() {
        let mut h = harness();
        let states = h.bus.session_state.subscribe();
        let full = wav(2);
        let half = full[..44 + (full.len() - 44) / 2].to_vec();

        let err = h.player.load_bytes(half).unwrap_err();
        assert!(matches!(err, WaveError::Decode(_)));
        assert_eq!(h.player.state(), SessionState::Unready);
        assert_eq!(h.player.duration(), 0.0);
        assert!(states.try_recv().is_err());
    }

    #[test]
    fn failed_reload_keeps_previous_session() {
        let mut h = loaded();
        h.player.seek_to(0.3).unwrap();
        assert!(h.player.load_bytes(b"not audio".to_vec()).is_err());
        assert_eq!(h.player.state(), SessionState::Ready);
        assert!((h.player.current_time() - 3.0).abs() < 1e-3);
    }

    #[test]
    fn missing_url_is_fetch_error() {
        let mut h = harness();
        assert!(matches!(h.player.load("mem://nope"), Err(WaveError::Fetch(_))));
    }

    #[test]
    fn load_applies_default_filter_and_draws() {
        let mut s = settings();
        s.default_filter = Some("half".to_string());
        let mut h = harness_with(s);
        h.player.load("mem://ten.wav").unwrap();

        assert_eq!(h.player.selected_filter(), Some("half"));
        assert_eq!(h.player.codec_info().unwrap().sample_rate, RATE);
        let drawn = h.drawn.lock().unwrap();
        assert_eq!(drawn.waves, vec![(800, 800)]);
    }

    #[test]
    fn background_load_applies_on_poll() {
        let mut h = harness();
        let generation = h.player.begin_load_bytes(wav(1)).unwrap();
        assert_eq!(generation, 1);
        assert!(h.player.is_loading());

        let deadline = Instant::now() + Duration::from_secs(10);
        while h.player.is_loading() {
            h.player.poll().unwrap();
            assert!(Instant::now() < deadline, "decode did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(h.player.state(), SessionState::Ready);
        assert!((h.player.duration() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn superseded_load_is_discarded() {
        let mut h = harness();
        h.player.begin_load_bytes(wav(2)).unwrap();
        h.player.begin_load_bytes(wav(1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while h.player.is_loading() {
            h.player.poll().unwrap();
            assert!(Instant::now() < deadline, "decode did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!((h.player.duration() - 1.0).abs() < 1e-3);
        let stats = h.player.stats();
        assert_eq!(stats.decodes_completed, 1);
        assert_eq!(stats.decodes_discarded, 1);
    }

    #[test]
    fn failed_background_load_surfaces_on_poll() {
        let mut h = harness();
        h.player.begin_load_bytes(vec![1, 2, 3]).unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut result = Ok(());
        while h.player.is_loading() {
            result = h.player.poll();
            assert!(Instant::now() < deadline, "decode did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(result.is_err());
        assert_eq!(h.player.state(), SessionState::Unready);
    }

    // --- Filters ---

    #[test]
    fn change_filter_twice_refilters_once() {
        let mut h = loaded();
        h.player.change_filter("half").unwrap();
        h.player.change_filter("half").unwrap();
        assert_eq!(h.player.stats().refilters, 1);
        assert_eq!(h.player.selected_filter(), Some("half"));
    }

    #[test]
    fn change_filter_to_current_is_noop() {
        let mut h = loaded();
        let draws = h.player.stats().draws;
        h.player.change_filter("flat").unwrap();
        assert_eq!(h.player.stats().refilters, 0);
        assert_eq!(h.player.stats().draws, draws);
    }

    #[test]
    fn unknown_filter_leaves_state() {
        let mut h = loaded();
        h.player.play().unwrap();
        let err = h.player.change_filter("missing").unwrap_err();
        assert!(matches!(err, WaveError::FilterNotFound(_)));
        assert_eq!(h.player.state(), SessionState::Playing);
        assert_eq!(h.player.selected_filter(), Some("flat"));
    }

    #[test]
    fn change_filter_pauses_and_keeps_position() {
        let mut h = loaded();
        h.player.play().unwrap();
        h.transport.render(RATE as usize);

        h.player.change_filter("half").unwrap();
        assert_eq!(h.player.state(), SessionState::Paused);
        assert!((h.player.current_time() - 1.0).abs() < 1e-3);
        assert!(h.transport.running_sources().is_empty());

        // resumed audio is the filtered buffer
        h.player.play().unwrap();
        let quiet = h.transport.render(2000);
        let loud_max = 500.0 * 20.0 / 32768.0;
        assert!(quiet.iter().all(|s| s.abs() <= loud_max * 0.5 + 1e-3));
    }

    // --- Transport ---

    #[test]
    fn play_pause_toggles() {
        let mut h = loaded();
        h.player.play_pause().unwrap();
        assert_eq!(h.player.state(), SessionState::Playing);
        h.player.play_pause().unwrap();
        assert_eq!(h.player.state(), SessionState::Paused);
    }

    #[test]
    fn pause_when_paused_publishes_nothing() {
        let mut h = loaded();
        let states = h.bus.session_state.subscribe();
        h.player.pause().unwrap();
        assert!(states.try_recv().is_err());
    }

    #[test]
    fn play_range_ends_paused() {
        let mut h = loaded();
        h.player.play_range(2.0, 3.0).unwrap();
        h.transport.render_to_end(4096);
        h.player.poll().unwrap();
        assert_eq!(h.player.state(), SessionState::Paused);
        assert!((h.player.current_time() - 3.0).abs() < 1e-3);
    }

    #[test]
    fn natural_end_becomes_paused() {
        let mut h = loaded();
        let states = h.bus.session_state.subscribe();
        h.player.seek_to(0.95).unwrap();
        h.player.play().unwrap();
        h.transport.render_to_end(8192);
        h.player.poll().unwrap();

        assert_eq!(h.player.state(), SessionState::Paused);
        assert_eq!(h.player.played_percents(), 1.0);
        let got: Vec<_> = states.try_iter().collect();
        assert_eq!(got, vec![SessionState::Playing, SessionState::Paused]);

        // playing again starts over
        h.player.play().unwrap();
        assert!(h.player.current_time() < 0.01);
    }

    #[test]
    fn at_most_one_source_runs() {
        let mut h = loaded();
        h.player.play().unwrap();
        h.player.seek_to(0.2).unwrap();
        h.player.play().unwrap();
        h.player.seek_to(0.7).unwrap();
        assert_eq!(h.transport.running_sources().len(), 1);
        assert!(h.player.stats().sources_built >= 4);
    }

    // --- Seek ---

    #[test]
    fn seek_to_keeps_play_state() {
        for fraction in [0.0, 0.25, 0.5, 1.0] {
            let mut h = loaded();
            h.player.seek_to(fraction).unwrap();
            assert!(h.player.is_paused());
            assert!((h.player.played_percents() - fraction).abs() < 1e-3);

            h.player.play().unwrap();
            h.player.seek_to(fraction).unwrap();
            if fraction < 1.0 {
                assert!(!h.player.is_paused());
            }
            assert!((h.player.played_percents() - fraction).abs() < 1e-3);
            assert_eq!(h.player.state(), SessionState::Playing);
        }
    }

    #[test]
    fn seek_renders_with_scroll_disabled_then_restores() {
        let mut h = loaded();
        h.player.zoom(100.0);
        h.player.seek_to(0.4).unwrap();

        assert_eq!(h.drawn.lock().unwrap().progress.last(), Some(&(0.4, false)));
        assert!(h.player.zoom_state().scroll);
        assert!(h.player.view().scroll);
    }

    #[test]
    fn seek_to_clamps_fraction() {
        let mut h = loaded();
        h.player.seek_to(7.0).unwrap();
        assert_eq!(h.player.played_percents(), 1.0);
        h.player.seek_to(f64::NAN).unwrap();
        assert_eq!(h.player.played_percents(), 0.0);
    }

    #[test]
    fn click_seeks() {
        let mut h = loaded();
        h.bus.renderer_interaction.emit(Interaction {
            kind: InteractionKind::Click,
            progress: 0.6,
        });
        h.bus.renderer_interaction.emit(Interaction {
            kind: InteractionKind::DoubleClick,
            progress: 0.1,
        });
        h.player.poll().unwrap();
        assert!((h.player.current_time() - 6.0).abs() < 1e-3);
    }

    // --- Volume ---

    #[test]
    fn legacy_policy_never_keeps_mute() {
        let mut h = loaded();
        h.player.set_volume(0.0);
        assert!(!h.player.is_muted());
        assert_eq!(h.player.volume(), 0.0);
        h.player.set_volume(0.6);
        assert!(!h.player.is_muted());
        assert!((h.player.volume() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn sticky_policy_mutes_at_zero() {
        let mut h = harness_with(PlayerSettings {
            mute_policy: MutePolicy::Sticky,
            ..settings()
        });
        h.player.load("mem://ten.wav").unwrap();
        h.player.set_volume(0.0);
        assert!(h.player.is_muted());
        h.player.set_volume(0.4);
        assert!(!h.player.is_muted());
    }

    #[test]
    fn play_restores_saved_volume() {
        let mut h = loaded();
        h.player.set_volume(0.5);
        h.player.set_muted(true);
        h.player.play().unwrap();
        assert!(h.transport.render(10).iter().all(|&s| s == 0.0));

        h.player.set_muted(false);
        h.player.pause().unwrap();
        h.player.play().unwrap();
        assert!((h.player.volume() - 0.5).abs() < 1e-6);
        assert!(h.transport.render(RATE as usize).iter().any(|&s| s != 0.0));
    }

    // --- Zoom / draw ---

    #[test]
    fn zoom_is_path_independent() {
        let mut direct = loaded();
        direct.player.zoom(0.0);

        let mut walked = loaded();
        walked.player.zoom(0.0);
        walked.player.zoom(5.0);
        walked.player.zoom(0.0);

        let a = direct.player.zoom_state();
        let b = walked.player.zoom_state();
        assert_eq!((a.scroll, a.auto_center), (b.scroll, b.auto_center));
        assert!(!b.scroll && !b.auto_center);
        assert_eq!(b.min_px_per_sec, 5.0);
    }

    #[test]
    fn zoom_publishes_and_redraws() {
        let mut h = loaded();
        let control = h.bus.external_control.subscribe();
        h.player.zoom(200.0);

        let ControlEvent::Zoom { scroll, view } = control.try_recv().unwrap();
        assert!(scroll);
        // 10 s at 200 px/s scrolls past the 800 px container
        assert_eq!(view.width, 2000);
        assert_eq!(h.drawn.lock().unwrap().waves.last(), Some(&(2000, 2000)));

        h.player.zoom(-1.0);
        let ControlEvent::Zoom { scroll, view } = control.try_recv().unwrap();
        assert!(!scroll);
        assert_eq!(view.width, 800);
    }

    #[test]
    fn extreme_zoom_draws_capped_width() {
        let mut h = loaded();
        h.player.zoom(1e9);
        assert_eq!(h.player.view().width, MAX_RENDER_WIDTH);
        let drawn = h.drawn.lock().unwrap();
        assert_eq!(
            drawn.waves.last(),
            Some(&(MAX_RENDER_WIDTH, MAX_RENDER_WIDTH as usize))
        );
    }

    #[test]
    fn zoom_before_load_only_updates_state() {
        let mut h = harness();
        h.player.zoom(50.0);
        assert!(h.player.zoom_state().scroll);
        assert!(h.drawn.lock().unwrap().waves.is_empty());
    }

    #[test]
    fn progress_ticks_redraw_progress() {
        let mut h = loaded();
        let progress = h.player.progress_receiver();
        h.player.play().unwrap();
        h.transport.render(4 * 512);
        h.player.poll().unwrap();

        assert_eq!(progress.try_iter().count(), 4);
        let last = h.drawn.lock().unwrap().progress.last().copied().unwrap();
        assert!((last.0 - h.player.played_percents()).abs() < 1e-9);
    }

    #[test]
    fn poll_drains_signal_queues() {
        let mut h = loaded();
        h.player.play().unwrap();
        h.transport.render(20 * 512);
        assert_eq!(h.player.tick_rx.len(), 20);
        assert!(h.player.signal_rx.len() >= 1);

        h.player.poll().unwrap();
        assert!(h.player.tick_rx.is_empty());
        assert!(h.player.signal_rx.is_empty());
    }

    // --- Plugins ---

    #[test]
    fn plugins_start_on_ready_and_follow_zoom() {
        let surface = RecordingSurface::default();
        let calls = surface.calls.clone();
        let mut h = harness_with(PlayerSettings {
            plugins: vec![
                PluginSpec::new(TIMELINE_KIND, serde_json::json!({ "interval": 2 })),
                PluginSpec::new("minimap", serde_json::Value::Null),
            ],
            ..settings()
        });
        h.player.register_plugin(
            TIMELINE_KIND,
            TimelinePlugin::factory(move || Box::new(surface.clone()) as Box<dyn TimelineSurface>),
        );
        assert_eq!(h.player.plugin_count(), 0);

        h.player.load("mem://ten.wav").unwrap();
        assert_eq!(h.player.plugin_count(), 1);
        let after_init = calls.lock().unwrap().len();

        h.player.zoom(300.0);
        h.player.poll().unwrap();
        assert!(calls.lock().unwrap().len() > after_init);

        // reload does not spawn a second set
        h.player.load("mem://ten.wav").unwrap();
        assert_eq!(h.player.plugin_count(), 1);
    }

    #[test]
    fn settings_with_bad_filter_rejected() {
        let transport = ManualTransport::new();
        let host = Host::new(Box::new(transport), Box::new(crate::wave::renderer::NullRenderer::new(100)));
        let bad = PlayerSettings {
            filters: vec![FilterDescriptor::new("bad", vec![1.0, 2.0])],
            ..PlayerSettings::default()
        };
        assert!(Player::new(bad, host, Arc::new(EventBus::new())).is_err());
    }
}
