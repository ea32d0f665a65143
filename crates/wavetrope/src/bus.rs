//! Event bus
//!
//! A fixed set of named broadcast channels that decouple the player from
//! its renderers. Each `Channel` fans events out to every receiver that
//! subscribed before the event was published; late subscribers miss past
//! events. Dropping a receiver unsubscribes it.

use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::audio::types::SessionState;
use crate::wave::view::ViewSnapshot;

/// Progress notification emitted by a running playback source every block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressTick {
    /// Id of the source that produced the tick
    pub source: u64,
    /// Number of blocks this source has rendered so far
    pub block: u64,
    /// Playback position in seconds
    pub position: f64,
    /// Playback position as a fraction of the duration (0.0..=1.0)
    pub fraction: f64,
}

impl ProgressTick {
    /// Position as a percentage (0.0..=100.0)
    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}

/// Lifecycle signals from the playback engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// A new source started rendering
    Started { source: u64 },
    /// A source was stopped (pause, seek, rebuild or new buffer)
    Stopped { source: u64 },
    /// A source reached the end of its range on its own
    Finished { source: u64 },
}

/// Kind of pointer interaction reported by a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Click,
    DoubleClick,
}

/// Pointer interaction reported by a renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub kind: InteractionKind,
    /// Horizontal position of the interaction as a fraction of the wave
    pub progress: f64,
}

/// Commands published by the player for dependent renderers
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// The zoom level changed; dependents should resynchronize their layout
    Zoom { scroll: bool, view: ViewSnapshot },
}

/// One named multicast channel
pub struct Channel<T> {
    name: &'static str,
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> Channel<T> {
    /// Create a channel with no subscribers
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Channel name as seen by renderer plugins
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Subscribe to events. Returns a receiver that will get all future events.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Emit an event to all subscribers. Removes disconnected subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, event: T) -> usize {
        match self.subscribers.lock() {
            Ok(mut subs) => {
                subs.retain(|tx| tx.send(event.clone()).is_ok());
                subs.len()
            }
            Err(_) => 0,
        }
    }

    /// Number of live subscribers as of the last emit
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// The statically known set of channels shared by a player and its renderers
pub struct EventBus {
    pub session_state: Channel<SessionState>,
    pub external_control: Channel<ControlEvent>,
    pub progress_tick: Channel<ProgressTick>,
    pub playback_state: Channel<PlaybackSignal>,
    pub renderer_interaction: Channel<Interaction>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a new event bus with no subscribers
    pub fn new() -> Self {
        Self {
            session_state: Channel::new("sessionState"),
            external_control: Channel::new("externalControl"),
            progress_tick: Channel::new("progressTick"),
            playback_state: Channel::new("playbackState"),
            renderer_interaction: Channel::new("rendererInteraction"),
        }
    }

    /// Names of all channels, in declaration order
    pub fn channel_names(&self) -> [&'static str; 5] {
        [
            self.session_state.name(),
            self.external_control.name(),
            self.progress_tick.name(),
            self.playback_state.name(),
            self.renderer_interaction.name(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // --- Channel ---

    #[test]
    fn subscribe_and_emit() {
        let bus = EventBus::new();
        let rx = bus.session_state.subscribe();

        bus.session_state.emit(SessionState::Ready);

        assert_eq!(rx.recv().unwrap(), SessionState::Ready);
    }

    #[test]
    fn multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let rx1 = bus.session_state.subscribe();
        let rx2 = bus.session_state.subscribe();

        let delivered = bus.session_state.emit(SessionState::Playing);

        assert_eq!(delivered, 2);
        assert_eq!(rx1.recv().unwrap(), SessionState::Playing);
        assert_eq!(rx2.recv().unwrap(), SessionState::Playing);
    }

    #[test]
    fn late_subscriber_misses_past_events() {
        let bus = EventBus::new();
        bus.session_state.emit(SessionState::Ready);
        let rx = bus.session_state.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disconnected_subscriber_cleanup() {
        let bus = EventBus::new();
        let rx1 = bus.progress_tick.subscribe();
        let _rx2 = bus.progress_tick.subscribe();
        drop(rx1);

        let delivered = bus.progress_tick.emit(ProgressTick {
            source: 1,
            block: 1,
            position: 0.1,
            fraction: 0.01,
        });

        assert_eq!(delivered, 1);
        assert_eq!(bus.progress_tick.subscriber_count(), 1);
    }

    #[test]
    fn emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.playback_state.emit(PlaybackSignal::Started { source: 1 }), 0);

        let rx = bus.playback_state.subscribe();
        drop(rx);
        assert_eq!(bus.playback_state.emit(PlaybackSignal::Stopped { source: 1 }), 0);
    }

    #[test]
    fn same_channel_is_fifo() {
        let bus = EventBus::new();
        let rx = bus.session_state.subscribe();

        bus.session_state.emit(SessionState::Ready);
        bus.session_state.emit(SessionState::Playing);
        bus.session_state.emit(SessionState::Paused);

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![SessionState::Ready, SessionState::Playing, SessionState::Paused]
        );
    }

    #[test]
    fn channels_are_independent() {
        let bus = EventBus::new();
        let state_rx = bus.session_state.subscribe();
        bus.renderer_interaction.emit(Interaction {
            kind: InteractionKind::Click,
            progress: 0.5,
        });
        assert!(state_rx.try_recv().is_err());
    }

    #[test]
    fn emit_from_another_thread() {
        let bus = Arc::new(EventBus::new());
        let rx = bus.progress_tick.subscribe();
        let bus_thread = bus.clone();
        std::thread::spawn(move || {
            bus_thread.progress_tick.emit(ProgressTick {
                source: 7,
                block: 3,
                position: 1.0,
                fraction: 0.5,
            });
        })
        .join()
        .unwrap();
        assert_eq!(rx.recv().unwrap().source, 7);
    }

    // --- Names / payloads ---

    #[test]
    fn channel_names_are_stable() {
        let bus = EventBus::new();
        assert_eq!(
            bus.channel_names(),
            [
                "sessionState",
                "externalControl",
                "progressTick",
                "playbackState",
                "rendererInteraction"
            ]
        );
    }

    #[test]
    fn progress_tick_percent() {
        let tick = ProgressTick {
            source: 1,
            block: 10,
            position: 2.5,
            fraction: 0.25,
        };
        assert!((tick.percent() - 25.0).abs() < 1e-9);
    }
}
