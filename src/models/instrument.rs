use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_STEP_SIZE: f64 = 0.001;
const DEFAULT_PRICE_PRECISION: u32 = 2;
/// Precision assumed for a symbol the exchange never described.
const FALLBACK_PRICE_PRECISION: u32 = 4;

/// Quantity and price granularity for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub step_size: f64,
    pub price_precision: u32,
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            price_precision: DEFAULT_PRICE_PRECISION,
        }
    }
}

impl InstrumentSpec {
    /// Build from the exchange's LOT_SIZE step and PRICE_FILTER tick.
    pub fn from_filters(step_size: Option<f64>, tick_size: Option<f64>) -> Self {
        Self {
            step_size: step_size
                .filter(|s| *s > 0.0)
                .unwrap_or(DEFAULT_STEP_SIZE),
            price_precision: tick_size
                .map(precision_for_tick)
                .unwrap_or(DEFAULT_PRICE_PRECISION),
        }
    }

    pub fn tick(&self) -> f64 {
        10f64.powi(-(self.price_precision as i32))
    }

    /// Round a quantity down to a whole number of steps.
    pub fn floor_quantity(&self, qty: f64) -> f64 {
        round_to((qty / self.step_size).floor() * self.step_size, 8)
    }

    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", self.price_precision as usize, price)
    }
}

/// Tick size to displayed decimal places, capped at five.
pub fn precision_for_tick(tick: f64) -> u32 {
    if tick < 1e-4 {
        5
    } else if tick < 1e-3 {
        4
    } else if tick < 1e-2 {
        3
    } else {
        2
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Plain decimal rendering for request parameters ("0.358", not "3.58e-1").
pub fn format_decimal(value: f64) -> String {
    let s = format!("{:.8}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Per-symbol metadata, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct InstrumentCache {
    specs: HashMap<String, InstrumentSpec>,
}

impl InstrumentCache {
    pub fn new(specs: HashMap<String, InstrumentSpec>) -> Self {
        Self { specs }
    }

    /// Spec for sizing; unknown symbols get a conservative default.
    pub fn spec_or_fallback(&self, symbol: &str) -> InstrumentSpec {
        self.specs.get(symbol).copied().unwrap_or(InstrumentSpec {
            step_size: DEFAULT_STEP_SIZE,
            price_precision: FALLBACK_PRICE_PRECISION,
        })
    }
}
