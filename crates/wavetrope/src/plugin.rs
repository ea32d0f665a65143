//! Renderer plugins
//!
//! Plugins are secondary renderers (the timeline, for one) that follow the
//! player through the event bus. A [`PluginRegistry`] maps a kind tag to a
//! factory; a [`PluginHost`] owns the live plugins and forwards zoom events.

use std::collections::HashMap;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::bus::{ControlEvent, EventBus};
use crate::error::Result;
use crate::wave::view::ViewSnapshot;

/// Capability shared by every renderer plugin
pub trait Plugin: Send {
    /// Kind tag the plugin was registered under
    fn kind(&self) -> &'static str;

    /// Build drawing resources and render for the first time
    fn init(&mut self, view: &ViewSnapshot) -> Result<()>;

    /// Resynchronize after a zoom change
    fn on_zoom(&mut self, view: &ViewSnapshot) -> Result<()>;

    /// Release drawing resources. Must be safe to call more than once.
    fn teardown(&mut self);
}

/// Builds a plugin from its host parameters
pub type PluginFactory =
    Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Plugin>> + Send + Sync>;

/// Host request for one plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl PluginSpec {
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// Kind tag → factory
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `kind`
    pub fn register(&mut self, kind: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Build a plugin. `None` if the kind is unknown.
    pub fn create(&self, spec: &PluginSpec) -> Option<Result<Box<dyn Plugin>>> {
        self.factories.get(&spec.kind).map(|f| f(&spec.params))
    }
}

/// Live plugins of one session
pub struct PluginHost {
    plugins: Vec<Box<dyn Plugin>>,
    control_rx: Receiver<ControlEvent>,
}

impl PluginHost {
    /// Create a host listening on the bus's control channel
    pub fn new(bus: &EventBus) -> Self {
        Self {
            plugins: Vec::new(),
            control_rx: bus.external_control.subscribe(),
        }
    }

    /// Create and initialize plugins for `specs`.
    ///
    /// Unknown kinds and plugins that fail to build or init are skipped with
    /// a warning. Returns the number of plugins started.
    pub fn spawn(&mut self, registry: &PluginRegistry, specs: &[PluginSpec], view: &ViewSnapshot) -> usize {
        let mut started = 0;
        for spec in specs {
            let mut plugin = match registry.create(spec) {
                None => {
                    log::warn!("unknown plugin kind '{}', skipping", spec.kind);
                    continue;
                }
                Some(Err(e)) => {
                    log::warn!("plugin '{}' failed to build: {}", spec.kind, e);
                    continue;
                }
                Some(Ok(plugin)) => plugin,
            };
            if let Err(e) = plugin.init(view) {
                log::warn!("plugin '{}' failed to init: {}", spec.kind, e);
                plugin.teardown();
                continue;
            }
            log::debug!("plugin '{}' started", spec.kind);
            self.plugins.push(plugin);
            started += 1;
        }
        started
    }

    /// Drain pending control events and forward them to every plugin.
    ///
    /// Returns the number of events handled.
    pub fn dispatch(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.control_rx.try_recv() {
            handled += 1;
            match event {
                ControlEvent::Zoom { view, .. } => {
                    for plugin in self.plugins.iter_mut() {
                        if let Err(e) = plugin.on_zoom(&view) {
                            log::warn!("plugin '{}' zoom resync failed: {}", plugin.kind(), e);
                        }
                    }
                }
            }
        }
        handled
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.kind()).collect()
    }

    /// Tear down and drop every plugin
    pub fn teardown_all(&mut self) {
        for mut plugin in self.plugins.drain(..) {
            plugin.teardown();
        }
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.teardown_all();
    }
}
