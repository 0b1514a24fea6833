//! Daily monetary spend accounting for cost-based limiting.
//!
//! Amounts are stored as integer micro-units so the shared store can keep them
//! in atomic integer counters without float drift.

use serde::{Deserialize, Serialize};

/// Micro-units per currency unit.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Per-subject ceiling for one UTC day, in currency units.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: f64,
    /// Service-wide daily total at which every costed request is hard-blocked.
    #[serde(default = "default_emergency_stop")]
    pub emergency_stop_threshold: f64,
}

fn default_daily_limit() -> f64 {
    5.0
}

fn default_emergency_stop() -> f64 {
    500.0
}

impl Default for SpendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            daily_limit: default_daily_limit(),
            emergency_stop_threshold: default_emergency_stop(),
        }
    }
}

impl SpendConfig {
    /// Converts a currency amount to micro-units, rounding to nearest.
    pub fn to_micros(amount: f64) -> i64 {
        if !amount.is_finite() || amount <= 0.0 {
            return 0;
        }
        (amount * MICROS_PER_UNIT as f64).round() as i64
    }

    pub fn daily_limit_micros(&self) -> i64 {
        Self::to_micros(self.daily_limit)
    }

    pub fn emergency_stop_micros(&self) -> i64 {
        Self::to_micros(self.emergency_stop_threshold)
    }

    /// True once the global daily total has reached the stop threshold.
    pub fn is_emergency_stopped(&self, global_total_micros: i64) -> bool {
        global_total_micros >= self.emergency_stop_micros()
    }
}

/// One subject's spend for the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpendLedger {
    pub spent_micros: i64,
}

impl SpendLedger {
    /// Parses the stored counter. Missing means nothing spent yet.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            None => Some(Self::default()),
            Some(value) => value
                .trim()
                .parse::<i64>()
                .ok()
                .map(|spent_micros| Self { spent_micros }),
        }
    }

    pub fn encode(&self) -> String {
        self.spent_micros.to_string()
    }

    /// Ledger after charging `amount_micros`, or `None` if it would pass `limit_micros`.
    pub fn charge(&self, amount_micros: i64, limit_micros: i64) -> Option<Self> {
        let spent_micros = self.spent_micros.saturating_add(amount_micros.max(0));
        (spent_micros <= limit_micros).then_some(Self { spent_micros })
    }

    pub fn refund(&self, amount_micros: i64) -> Self {
        Self {
            spent_micros: (self.spent_micros - amount_micros.max(0)).max(0),
        }
    }
}
