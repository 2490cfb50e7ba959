use tracing::warn;

use crate::config::Config;
use crate::models::instrument::round_to;
use crate::models::{InstrumentSpec, Interval, Side, TradeProposal};

/// Stop sits this fraction of the bar range below the low.
const STOP_EXTENSION: f64 = 0.272;
/// Target sits this fraction of the bar range below the high.
const TARGET_RETRACE: f64 = 0.382;

/// Account-level inputs to position sizing for one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingParams {
    pub investment_unit: f64,
    pub max_leverage: u32,
    pub margin_rate: f64,
}

impl SizingParams {
    pub fn for_symbol(cfg: &Config, symbol: &str) -> Self {
        Self {
            investment_unit: cfg.investment_unit,
            max_leverage: cfg.max_leverage,
            margin_rate: cfg.margin_rate(symbol),
        }
    }
}

/// Reference prices taken from the signal bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevels {
    /// Entry reference, the signal bar's close.
    pub open_price: f64,
    pub low_price: f64,
    pub high_price: f64,
}

/// Derive entry, stop, target, leverage and quantity for a long setup.
///
/// Returns `None` for degenerate inputs (zero entry, zero risk, leverage
/// below 1x or any non-finite intermediate).
///
/// The quantity is sized with the *uncapped* leverage while the capped value
/// is what gets set on the account. That mismatch is deliberate and covered by
/// `quantity_uses_uncapped_leverage` below.
pub fn trade_parameters(
    symbol: &str,
    interval: Interval,
    levels: PriceLevels,
    spec: &InstrumentSpec,
    params: &SizingParams,
) -> Option<TradeProposal> {
    let PriceLevels {
        open_price,
        low_price,
        high_price,
    } = levels;
    if ![open_price, low_price, high_price].iter().all(|v| v.is_finite()) {
        return None;
    }

    let precision = spec.price_precision;
    let entry = round_to(open_price, precision);
    let price_diff = high_price - low_price;

    let raw_stop = low_price - price_diff * STOP_EXTENSION;
    let mut stop_loss = round_to(raw_stop, precision);
    if stop_loss >= entry {
        stop_loss = round_to(entry - spec.tick(), precision);
        warn!(
            "{} stop-loss clamped to {} (computed {})",
            symbol, stop_loss, raw_stop
        );
    }

    let take_profit = round_to(high_price - price_diff * TARGET_RETRACE, precision);

    if entry == 0.0 {
        return None;
    }

    let risk_pct = ((entry - stop_loss) / entry * 100.0).abs();
    if risk_pct == 0.0 || !risk_pct.is_finite() {
        return None;
    }

    let reward_pct = ((take_profit - entry) / entry * 100.0).abs();
    let risk_reward = round_to(reward_pct / risk_pct, 2);

    let leverage_raw = (1.0 / (params.margin_rate + risk_pct / 100.0)).floor();
    if !leverage_raw.is_finite() || leverage_raw < 1.0 {
        return None;
    }
    let sizing_leverage = leverage_raw.min(u32::MAX as f64) as u32;
    let leverage = sizing_leverage.min(params.max_leverage);
    if leverage == 0 {
        return None;
    }

    let quantity = spec.floor_quantity(params.investment_unit * sizing_leverage as f64 / entry);
    if !quantity.is_finite() {
        return None;
    }

    let proposal = TradeProposal {
        symbol: symbol.to_string(),
        side: Side::Buy,
        interval,
        entry,
        quantity,
        stop_loss,
        take_profit,
        leverage,
        sizing_leverage,
        risk_pct: round_to(risk_pct, 2),
        reward_pct: round_to(reward_pct, 2),
        risk_reward,
    };

    let required_margin = proposal.required_margin();
    if required_margin > params.investment_unit {
        warn!(
            "{} insufficient margin: {:.2} required, {:.2} allotted",
            symbol, required_margin, params.investment_unit
        );
    }

    Some(proposal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SizingParams {
        SizingParams {
            investment_unit: 2.0,
            max_leverage: 20,
            margin_rate: 0.01,
        }
    }

    fn spec(precision: u32) -> InstrumentSpec {
        InstrumentSpec {
            step_size: 0.001,
            price_precision: precision,
        }
    }

    fn levels(open_price: f64, low_price: f64, high_price: f64) -> PriceLevels {
        PriceLevels {
            open_price,
            low_price,
            high_price,
        }
    }

    #[test]
    fn worked_example() {
        let p = trade_parameters(
            "ETHUSDT",
            Interval::H1,
            levels(100.5, 99.0, 110.0),
            &spec(2),
            &params(),
        )
        .unwrap();
        assert_eq!(p.side, Side::Buy);
        assert!((p.entry - 100.5).abs() < 1e-9);
        // 99 - 11 * 0.272 = 96.008
        assert!((p.stop_loss - 96.01).abs() < 1e-9);
        // 110 - 11 * 0.382 = 105.798
        assert!((p.take_profit - 105.8).abs() < 1e-9);
        assert!((p.risk_pct - 4.47).abs() < 1e-9);
        assert!((p.reward_pct - 5.27).abs() < 1e-9);
        assert!((p.risk_reward - 1.18).abs() < 1e-9);
        // floor(1 / (0.01 + 0.044677)) = 18
        assert_eq!(p.leverage, 18);
        assert_eq!(p.sizing_leverage, 18);
        // floor_step(2 * 18 / 100.5) = 0.358
        assert!((p.quantity - 0.358).abs() < 1e-12);
    }

    #[test]
    fn quantity_uses_uncapped_leverage() {
        // A tight stop makes the raw leverage exceed the cap.
        let mut tight = params();
        tight.max_leverage = 5;
        let p = trade_parameters(
            "ETHUSDT",
            Interval::H1,
            levels(100.0, 99.9, 100.2),
            &spec(2),
            &tight,
        )
        .unwrap();
        assert_eq!(p.leverage, 5);
        assert!(p.sizing_leverage > p.leverage);
        let expected = spec(2).floor_quantity(2.0 * p.sizing_leverage as f64 / p.entry);
        assert!((p.quantity - expected).abs() < 1e-12);
        // The position is therefore oversized relative to the capped leverage.
        assert!(p.required_margin() > tight.investment_unit);
    }

    #[test]
    fn stop_is_clamped_one_tick_below_entry() {
        // Stop rounds up onto the entry at two decimals.
        let p = trade_parameters(
            "XRPUSDT",
            Interval::H4,
            levels(1.004, 1.004, 1.0041),
            &spec(2),
            &params(),
        )
        .unwrap();
        assert!((p.entry - 1.0).abs() < 1e-12);
        assert!((p.stop_loss - 0.99).abs() < 1e-12);
        assert!(p.stop_loss < p.entry);
    }

    #[test]
    fn stop_below_zero_cannot_be_leveraged() {
        // A negative stop means more than 100% risk, so leverage floors to 0x.
        for margin_rate in [0.0, 0.01] {
            let p = trade_parameters(
                "ADAUSDT",
                Interval::D1,
                levels(0.5, 0.001, 0.6),
                &spec(2),
                &SizingParams {
                    margin_rate,
                    ..params()
                },
            );
            assert!(p.is_none());
        }
    }

    #[test]
    fn zero_entry_is_rejected() {
        let p = trade_parameters(
            "ADAUSDT",
            Interval::H1,
            levels(0.004, 0.001, 0.009),
            &spec(2),
            &params(),
        );
        assert!(p.is_none());
    }

    #[test]
    fn non_finite_inputs_are_rejected() {
        let p = trade_parameters(
            "ETHUSDT",
            Interval::H1,
            levels(f64::NAN, 99.0, 110.0),
            &spec(2),
            &params(),
        );
        assert!(p.is_none());
    }

    #[test]
    fn margin_shortfall_is_not_a_rejection() {
        let mut small = params();
        small.max_leverage = 1;
        let p = trade_parameters(
            "ETHUSDT",
            Interval::H1,
            levels(100.5, 99.0, 110.0),
            &spec(2),
            &small,
        )
        .unwrap();
        assert_eq!(p.leverage, 1);
        assert!(p.required_margin() > small.investment_unit);
    }
}
