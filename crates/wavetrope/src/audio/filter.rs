//! Biquad filter stage
//!
//! A filter is an ordered cascade of second-order sections, each given as
//! `[b0, b1, b2, a1, a2]` with `a0` normalized to 1. An empty coefficient
//! list is the identity filter. Filtering always produces a new buffer.

use serde::{Deserialize, Serialize};

use crate::config::audio::BIQUAD_COEFFICIENTS;
use crate::error::{Result, WaveError};

use super::types::SampleBuffer;

/// A named filter as configured by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    #[serde(alias = "filterID", alias = "filterId")]
    pub id: String,
    #[serde(default)]
    pub coefficients: Vec<f64>,
}

impl FilterDescriptor {
    pub fn new(id: impl Into<String>, coefficients: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            coefficients,
        }
    }

    /// Identity filter with the given id
    pub fn identity(id: impl Into<String>) -> Self {
        Self::new(id, Vec::new())
    }

    pub fn is_identity(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Check that the coefficients form whole, finite biquad sections
    pub fn validate(&self) -> Result<()> {
        if self.coefficients.len() % BIQUAD_COEFFICIENTS != 0 {
            return Err(WaveError::InvalidFilter(format!(
                "{}: {} coefficients is not a multiple of {}",
                self.id,
                self.coefficients.len(),
                BIQUAD_COEFFICIENTS
            )));
        }
        if let Some(bad) = self.coefficients.iter().find(|c| !c.is_finite()) {
            return Err(WaveError::InvalidFilter(format!(
                "{}: non-finite coefficient {}",
                self.id, bad
            )));
        }
        Ok(())
    }

    fn sections(&self) -> impl Iterator<Item = Biquad> + '_ {
        self.coefficients
            .chunks_exact(BIQUAD_COEFFICIENTS)
            .map(|c| Biquad::new(c[0], c[1], c[2], c[3], c[4]))
    }
}

/// One biquad section in transposed direct form II
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }
}

/// Run `buffer` through `filter`, returning a new buffer.
///
/// Every channel is filtered independently, starting from zero state.
pub fn apply_filter(buffer: &SampleBuffer, filter: &FilterDescriptor) -> Result<SampleBuffer> {
    filter.validate()?;
    if filter.is_identity() {
        return Ok(buffer.clone());
    }

    buffer.map_channels(|samples| {
        let mut cascade: Vec<Biquad> = filter.sections().collect();
        samples
            .iter()
            .map(|&s| {
                let out = cascade
                    .iter_mut()
                    .fold(s as f64, |acc, section| section.process(acc));
                out as f32
            })
            .collect()
    })
}

/// The filters a session can switch between, in configuration order
#[derive(Debug, Clone, Default)]
pub struct FilterBank {
    filters: Vec<FilterDescriptor>,
}

impl FilterBank {
    /// Build a bank, rejecting invalid descriptors
    pub fn new(filters: Vec<FilterDescriptor>) -> Result<Self> {
        for filter in &filters {
            filter.validate()?;
        }
        Ok(Self { filters })
    }

    /// Look up a filter by id
    pub fn get(&self, id: &str) -> Result<&FilterDescriptor> {
        self.filters
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| WaveError::FilterNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.filters.iter().any(|f| f.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|f| f.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
