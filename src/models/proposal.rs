use serde::{Deserialize, Serialize};

use crate::models::{Interval, Side};

/// A fully sized long entry derived from one detected pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub symbol: String,
    pub side: Side,
    pub interval: Interval,
    pub entry: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Leverage set on the account, capped at the configured maximum.
    pub leverage: u32,
    /// Uncapped leverage the quantity was sized with.
    pub sizing_leverage: u32,
    pub risk_pct: f64,
    pub reward_pct: f64,
    pub risk_reward: f64,
}

impl TradeProposal {
    /// Margin the exchange will lock for this order at the capped leverage.
    pub fn required_margin(&self) -> f64 {
        if self.leverage == 0 {
            return f64::INFINITY;
        }
        self.quantity * self.entry / self.leverage as f64
    }

    pub fn is_funded(&self) -> bool {
        self.quantity > 0.0
    }
}
