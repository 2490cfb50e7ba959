//! Two-bar rejection-candle detector.
//!
//! The signal bar (the last closed bar) must have a small body, a long upper
//! wick and a short lower wick; the forming bar must then trade above the
//! signal bar's close. An accepted pattern is turned into a long
//! [`TradeProposal`] by [`trade_parameters`].

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::sizing::{trade_parameters, PriceLevels, SizingParams};
use crate::models::{Candle, InstrumentSpec, Interval, TradeProposal};

pub const BODY_RATIO_MAX: f64 = 0.25;
pub const UPPER_WICK_RATIO_MIN: f64 = 0.65;
pub const LOWER_WICK_RATIO_MAX: f64 = 0.20;
/// Bars with a smaller high-low range carry no shape information.
const MIN_RANGE: f64 = 1e-8;

/// Body and wick sizes as fractions of the bar's range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleShape {
    pub body_ratio: f64,
    pub upper_wick_ratio: f64,
    pub lower_wick_ratio: f64,
}

impl CandleShape {
    pub fn of(candle: &Candle) -> Option<Self> {
        let range = candle.total_range();
        if !range.is_finite() || range < MIN_RANGE {
            return None;
        }
        let shape = Self {
            body_ratio: candle.body() / range,
            upper_wick_ratio: candle.upper_wick() / range,
            lower_wick_ratio: candle.lower_wick() / range,
        };
        let finite = shape.body_ratio.is_finite()
            && shape.upper_wick_ratio.is_finite()
            && shape.lower_wick_ratio.is_finite();
        finite.then_some(shape)
    }

    pub fn is_rejection(&self) -> bool {
        self.body_ratio < BODY_RATIO_MAX
            && self.upper_wick_ratio > UPPER_WICK_RATIO_MIN
            && self.lower_wick_ratio < LOWER_WICK_RATIO_MAX
    }
}

/// Everything besides the bars that a detection needs.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub symbol: &'a str,
    pub interval: Interval,
    pub spec: &'a InstrumentSpec,
    pub sizing: &'a SizingParams,
}

/// Evaluate the closed `prior` bar and the forming `current` bar at `now`.
///
/// `None` means "no signal" and is never an error: unclosed bars,
/// zero-range bars, failed confirmation and degenerate trade parameters all
/// end up here.
pub fn detect(
    prior: &Candle,
    current: &Candle,
    ctx: &SignalContext<'_>,
    now: DateTime<Utc>,
) -> Option<TradeProposal> {
    if !prior.is_closed_at(now) {
        debug!(
            "{} {} signal bar still open until {}",
            ctx.symbol, ctx.interval, prior.close_time
        );
        return None;
    }

    let shape = CandleShape::of(prior)?;
    let confirmed = prior.close < current.high;
    if !(shape.is_rejection() && confirmed) {
        return None;
    }

    debug!(
        "{} {} pattern: body {:.3} upper {:.3} lower {:.3}",
        ctx.symbol, ctx.interval, shape.body_ratio, shape.upper_wick_ratio, shape.lower_wick_ratio
    );

    trade_parameters(
        ctx.symbol,
        ctx.interval,
        PriceLevels {
            open_price: prior.close,
            low_price: prior.low,
            high_price: prior.high,
        },
        ctx.spec,
        ctx.sizing,
    )
}
