//! Timeline ruler
//!
//! Computes tick marks and second labels for a ruler drawn under (or over)
//! the waveform. Layout is pure: [`compute_timeline`] turns a view snapshot
//! into a list of ticks, and [`TimelinePlugin`] pushes that list to a host
//! [`TimelineSurface`], rebuilding the surface on every zoom.

use serde::{Deserialize, Serialize};

use crate::config::timeline::{
    DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE, DEFAULT_HEIGHT, DEFAULT_PRIMARY_INTERVAL,
    DEFAULT_STRIDE_WIDTH, LABEL_BASELINE, LAST_LABEL_SHIFT, PRIMARY_TICK_OFFSET,
    SECONDARY_TICK_LENGTH,
};
use crate::error::{Result, WaveError};
use crate::plugin::{Plugin, PluginFactory};

use super::view::ViewSnapshot;

/// Plugin kind tag for the timeline
pub const TIMELINE_KIND: &str = "timeline";

/// Side of the ruler the ticks hang from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Top,
    #[default]
    Bottom,
}

fn default_height() -> f64 {
    DEFAULT_HEIGHT
}

fn default_interval() -> f64 {
    DEFAULT_PRIMARY_INTERVAL
}

fn default_stride_width() -> f64 {
    DEFAULT_STRIDE_WIDTH
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

fn default_font_family() -> String {
    DEFAULT_FONT_FAMILY.to_string()
}

/// Host parameters for the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineParams {
    /// Ruler height in CSS pixels
    #[serde(default = "default_height")]
    pub height: f64,

    /// Seconds between primary ticks
    #[serde(default = "default_interval")]
    pub interval: f64,

    /// Secondary ticks per primary interval (default: one per second)
    #[serde(default)]
    pub subdivisions: Option<u32>,

    /// Draw second labels next to primary ticks
    #[serde(default, alias = "displayInterval")]
    pub display_labels: bool,

    #[serde(default)]
    pub direction: Direction,

    /// Tick stroke width in pixels
    #[serde(default = "default_stride_width")]
    pub stride_width: f64,

    #[serde(default = "default_font_size")]
    pub font_size: u32,

    #[serde(default = "default_font_family")]
    pub font_family: String,
}

impl Default for TimelineParams {
    fn default() -> Self {
        Self {
            height: DEFAULT_HEIGHT,
            interval: DEFAULT_PRIMARY_INTERVAL,
            subdivisions: None,
            display_labels: false,
            direction: Direction::Bottom,
            stride_width: DEFAULT_STRIDE_WIDTH,
            font_size: DEFAULT_FONT_SIZE,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
        }
    }
}

impl TimelineParams {
    /// Parse host parameters, falling back to defaults for missing fields
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let params: Self = serde_json::from_value(value.clone())
            .map_err(|e| WaveError::Config(format!("timeline params: {}", e)))?;
        if !(params.interval.is_finite() && params.interval > 0.0) {
            return Err(WaveError::Config(format!(
                "timeline interval must be positive, got {}",
                params.interval
            )));
        }
        Ok(params)
    }

    fn secondary_per_primary(&self) -> u32 {
        self.subdivisions
            .unwrap_or_else(|| self.interval.round().max(1.0) as u32)
            .max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Origin,
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickLabel {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

/// One filled tick rectangle, in device pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub kind: TickKind,
    pub x: f64,
    pub y: f64,
    pub height: f64,
    pub label: Option<TickLabel>,
}

/// Everything needed to draw one ruler
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineLayout {
    /// Ruler width in device pixels
    pub width: f64,
    /// Surface height in device pixels
    pub height: f64,
    pub stride_width: f64,
    pub ticks: Vec<Tick>,
}

impl TimelineLayout {
    pub fn primaries(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.iter().filter(|t| t.kind == TickKind::Primary)
    }

    pub fn secondaries(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.iter().filter(|t| t.kind == TickKind::Secondary)
    }

    pub fn labels(&self) -> impl Iterator<Item = &TickLabel> {
        self.ticks.iter().filter_map(|t| t.label.as_ref())
    }
}

fn seconds_label(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as i64)
    } else {
        format!("{}", seconds)
    }
}

/// Lay out the ruler for `view`.
///
/// The ruler spans the container when filling without scroll, otherwise the
/// rendered wave. Primary ticks fall every `interval` seconds up to the
/// duration, secondary ticks subdivide each interval, and an origin tick
/// marks 0. The last primary label is pulled left so it is not clipped.
pub fn compute_timeline(view: &ViewSnapshot, params: &TimelineParams) -> TimelineLayout {
    let ratio = view.pixel_ratio;
    let width = if view.fill && !view.scroll {
        view.container_width
    } else {
        view.width
    } as f64;
    let height = params.height * ratio;
    let mut layout = TimelineLayout {
        width,
        height: (params.height + 1.0) * ratio,
        stride_width: params.stride_width,
        ticks: Vec::new(),
    };

    layout.ticks.push(Tick {
        kind: TickKind::Origin,
        x: 0.0,
        y: 0.0,
        height,
        label: params.display_labels.then(|| TickLabel {
            text: "0".to_string(),
            x: 0.0,
            y: LABEL_BASELINE * ratio,
        }),
    });

    let interval = params.interval;
    if !(view.duration.is_finite() && view.duration > 0.0 && interval > 0.0 && width > 0.0) {
        return layout;
    }
    let px_per_sec = width / view.duration;

    let (primary_y, primary_height) = match params.direction {
        Direction::Top => (0.0, height),
        Direction::Bottom => {
            let offset = PRIMARY_TICK_OFFSET * ratio;
            (offset, (height - offset).max(0.0))
        }
    };
    let (secondary_y, secondary_height) = match params.direction {
        Direction::Top => (0.0, (height - PRIMARY_TICK_OFFSET * ratio).max(0.0)),
        Direction::Bottom => {
            let length = SECONDARY_TICK_LENGTH * ratio;
            ((height - length).max(0.0), length)
        }
    };

    // small epsilon so 10.0 / 5.0 style divisions land on the boundary
    let primary_count = ((view.duration / interval) + 1e-9).floor() as u64;
    for k in 1..=primary_count {
        let seconds = k as f64 * interval;
        let x = seconds * px_per_sec;
        let padding = if seconds < 10.0 { 2.0 } else { 5.0 };
        let mut label_x = x - padding * ratio;
        if k == primary_count {
            label_x -= LAST_LABEL_SHIFT * ratio;
        }
        layout.ticks.push(Tick {
            kind: TickKind::Primary,
            x,
            y: primary_y,
            height: primary_height,
            label: params.display_labels.then(|| TickLabel {
                text: seconds_label(seconds),
                x: label_x,
                y: LABEL_BASELINE * ratio,
            }),
        });
    }

    let per_primary = params.secondary_per_primary();
    let step = interval / per_primary as f64;
    let segments = (view.duration / interval).ceil() as u64;
    for segment in 0..segments {
        let segment_start = segment as f64 * interval;
        for j in 1..per_primary {
            let seconds = segment_start + j as f64 * step;
            if seconds > view.duration + 1e-9 {
                break;
            }
            layout.ticks.push(Tick {
                kind: TickKind::Secondary,
                x: seconds * px_per_sec,
                y: secondary_y,
                height: secondary_height,
                label: None,
            });
        }
    }

    layout
}

/// Size and font of a timeline drawing surface
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSpec {
    /// Width in device pixels
    pub width: f64,
    /// Height in device pixels
    pub height: f64,
    pub pixel_ratio: f64,
    pub font_size: u32,
    pub font_family: String,
}

/// Host-side drawing surface for the timeline
pub trait TimelineSurface: Send {
    fn create(&mut self, spec: &SurfaceSpec) -> Result<()>;
    fn draw(&mut self, layout: &TimelineLayout);
    fn destroy(&mut self);
}

/// Renderer plugin that keeps a timeline in sync with the waveform
pub struct TimelinePlugin {
    params: TimelineParams,
    surface: Box<dyn TimelineSurface>,
    live: bool,
    last_layout: Option<TimelineLayout>,
}

impl TimelinePlugin {
    pub fn new(params: TimelineParams, surface: Box<dyn TimelineSurface>) -> Self {
        Self {
            params,
            surface,
            live: false,
            last_layout: None,
        }
    }

    /// Registry factory that parses params and asks `make_surface` for a surface
    pub fn factory<F>(make_surface: F) -> PluginFactory
    where
        F: Fn() -> Box<dyn TimelineSurface> + Send + Sync + 'static,
    {
        Box::new(move |value: &serde_json::Value| {
            let params = TimelineParams::from_value(value)?;
            Ok(Box::new(TimelinePlugin::new(params, make_surface())) as Box<dyn Plugin>)
        })
    }

    pub fn params(&self) -> &TimelineParams {
        &self.params
    }

    /// Layout most recently drawn
    pub fn last_layout(&self) -> Option<&TimelineLayout> {
        self.last_layout.as_ref()
    }

    fn render(&mut self, view: &ViewSnapshot) -> Result<()> {
        let layout = compute_timeline(view, &self.params);
        let spec = SurfaceSpec {
            width: layout.width,
            height: layout.height,
            pixel_ratio: view.pixel_ratio,
            font_size: self.params.font_size,
            font_family: self.params.font_family.clone(),
        };
        self.surface.create(&spec)?;
        self.live = true;
        self.surface.draw(&layout);
        self.last_layout = Some(layout);
        Ok(())
    }

    fn clear(&mut self) {
        if self.live {
            self.surface.destroy();
            self.live = false;
        }
    }
}

impl Plugin for TimelinePlugin {
    fn kind(&self) -> &'static str {
        TIMELINE_KIND
    }

    fn init(&mut self, view: &ViewSnapshot) -> Result<()> {
        self.render(view)
    }

    fn on_zoom(&mut self, view: &ViewSnapshot) -> Result<()> {
        self.clear();
        self.render(view)
    }

    fn teardown(&mut self) {
        self.clear();
    }
}
