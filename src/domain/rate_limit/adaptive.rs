//! Adaptive capacity scaling.
//!
//! The multiplier is computed per call from the caller's signals and is
//! never persisted, so a trust change takes effect on the next request.

use serde::{Deserialize, Serialize};

/// Relative weight of each signal. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveWeights {
    pub trust: f64,
    pub load: f64,
    pub behavior: f64,
}

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self {
            trust: 0.5,
            load: 0.3,
            behavior: 0.2,
        }
    }
}

impl AdaptiveWeights {
    pub fn sum(&self) -> f64 {
        self.trust + self.load + self.behavior
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub weights: AdaptiveWeights,
    #[serde(default = "default_min_multiplier")]
    pub min_capacity_multiplier: f64,
    #[serde(default = "default_max_multiplier")]
    pub max_capacity_multiplier: f64,
}

fn default_min_multiplier() -> f64 {
    0.5
}

fn default_max_multiplier() -> f64 {
    2.0
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            weights: AdaptiveWeights::default(),
            min_capacity_multiplier: default_min_multiplier(),
            max_capacity_multiplier: default_max_multiplier(),
        }
    }
}

/// Per-request inputs to the multiplier, each in `[0, 1]`.
///
/// `trust` and `behavior` are "higher is better"; `load` is "higher is worse".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdaptiveSignals {
    pub trust: Option<f64>,
    pub load: Option<f64>,
    pub behavior: Option<f64>,
}

impl AdaptiveSignals {
    pub fn is_empty(&self) -> bool {
        self.trust.is_none() && self.load.is_none() && self.behavior.is_none()
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl AdaptiveConfig {
    /// Multiplier applied to capacity and refill rate for this call.
    ///
    /// Missing signals are neutral (0.5). Disabled mode, or a call without any
    /// signal, yields exactly 1.0.
    pub fn multiplier(&self, signals: &AdaptiveSignals) -> f64 {
        if !self.enabled || signals.is_empty() {
            return 1.0;
        }

        let trust = unit(signals.trust.unwrap_or(0.5));
        let headroom = 1.0 - unit(signals.load.unwrap_or(0.5));
        let behavior = unit(signals.behavior.unwrap_or(0.5));

        let blend = self.weights.trust * trust
            + self.weights.load * headroom
            + self.weights.behavior * behavior;

        let span = self.max_capacity_multiplier - self.min_capacity_multiplier;
        (self.min_capacity_multiplier + unit(blend) * span)
            .clamp(self.min_capacity_multiplier, self.max_capacity_multiplier)
    }
}
