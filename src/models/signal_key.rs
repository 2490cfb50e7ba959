use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::Interval;

/// Identity of one pattern occurrence: symbol, interval and bar open time.
///
/// Rendered as `SYMBOL|interval|openTimeMs`, which is also the line format of
/// the processed-signals file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalKey {
    pub symbol: String,
    pub interval: Interval,
    pub open_time_ms: i64,
}

impl SignalKey {
    pub fn new(symbol: impl Into<String>, interval: Interval, open_time_ms: i64) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            open_time_ms,
        }
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.symbol, self.interval, self.open_time_ms)
    }
}

impl FromStr for SignalKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('|');
        let (Some(symbol), Some(interval), Some(ts), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("malformed signal key: {s}"));
        };
        if symbol.is_empty() {
            return Err(format!("malformed signal key: {s}"));
        }
        let interval = interval.parse::<Interval>()?;
        let open_time_ms = ts
            .parse::<i64>()
            .map_err(|e| format!("bad open time in {s}: {e}"))?;
        Ok(SignalKey::new(symbol, interval, open_time_ms))
    }
}
