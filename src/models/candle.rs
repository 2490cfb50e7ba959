use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLC bar for a symbol/interval pair, as returned by the kline endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn total_range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.close.max(self.open)
    }

    pub fn lower_wick(&self) -> f64 {
        self.close.min(self.open) - self.low
    }

    /// A bar is closed once its close time is no longer in the future.
    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.close_time
    }

    pub fn open_time_ms(&self) -> i64 {
        self.open_time.timestamp_millis()
    }
}
