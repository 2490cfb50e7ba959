use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Interval, OrderRole, OrderStatus, Side, TradeProposal};

/// One order this bot placed and still tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: u64,
    pub symbol: String,
    pub role: OrderRole,
    pub status: OrderStatus,
    pub side: Side,
    /// Limit price for entries and targets, trigger price for stops.
    pub price: f64,
    pub quantity: f64,
    pub leverage: u32,
    /// Bracket levels carried on the entry so its exits can be placed on fill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn entry(order_id: u64, proposal: &TradeProposal) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            symbol: proposal.symbol.clone(),
            role: OrderRole::Entry,
            status: OrderStatus::New,
            side: proposal.side,
            price: proposal.entry,
            quantity: proposal.quantity,
            leverage: proposal.leverage,
            stop_loss: Some(proposal.stop_loss),
            take_profit: Some(proposal.take_profit),
            interval: Some(proposal.interval),
            created_at: now,
            updated_at: now,
        }
    }

    /// Exit order protecting the position opened by `entry`.
    pub fn exit(order_id: u64, role: OrderRole, entry: &OrderRecord, price: f64) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            symbol: entry.symbol.clone(),
            role,
            status: OrderStatus::New,
            side: Side::Sell,
            price,
            quantity: entry.quantity,
            leverage: entry.leverage,
            stop_loss: None,
            take_profit: None,
            interval: entry.interval,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open_exit(&self) -> bool {
        self.role.is_exit() && !self.status.is_terminal()
    }

    /// Unfilled entry that is still waiting at the exchange.
    pub fn is_pending_entry(&self) -> bool {
        self.role == OrderRole::Entry && self.status == OrderStatus::New
    }
}
