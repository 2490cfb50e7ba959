pub mod binance;
pub mod error;

pub use binance::BinanceClient;
pub use error::{ExchangeError, Result};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Candle, InstrumentSpec, Interval, OrderStatus, PositionSide, Side};

/// Order type and its trigger/limit price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Good-till-cancel limit order.
    Limit { price: f64 },
    /// Market order triggered at `stop_price`.
    StopMarket { stop_price: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    /// Omitted for close-all orders.
    pub quantity: Option<f64>,
    pub close_position: bool,
    /// Set only when the account is in hedge mode.
    pub position_side: Option<PositionSide>,
    /// Price precision used when rendering prices.
    pub price_precision: u32,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: Side, price: f64, quantity: f64, price_precision: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Limit { price },
            quantity: Some(quantity),
            close_position: false,
            position_side: None,
            price_precision,
        }
    }

    /// Stop-market that closes the whole position when triggered.
    pub fn stop_close_all(symbol: &str, side: Side, stop_price: f64, price_precision: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::StopMarket { stop_price },
            quantity: None,
            close_position: true,
            position_side: None,
            price_precision,
        }
    }

    pub fn in_hedge_mode(mut self, hedge: bool, side: PositionSide) -> Self {
        self.position_side = hedge.then_some(side);
        self
    }

    pub fn price(&self) -> f64 {
        match self.kind {
            OrderKind::Limit { price } => price,
            OrderKind::StopMarket { stop_price } => stop_price,
        }
    }
}

/// Exchange view of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub order_id: u64,
    pub symbol: String,
    pub status: OrderStatus,
    /// Limit price; zero for market-type orders.
    pub price: f64,
    /// Trigger price; zero for plain limit orders.
    pub stop_price: f64,
    pub orig_qty: f64,
    pub executed_qty: f64,
}

impl OrderReport {
    /// The price a human would edit: trigger price if set, else limit price.
    pub fn working_price(&self) -> f64 {
        if self.stop_price > 0.0 {
            self.stop_price
        } else {
            self.price
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub position_side: String,
    pub amount: f64,
    pub entry_price: f64,
}

impl PositionInfo {
    pub fn is_open(&self) -> bool {
        self.amount.abs() > 0.0
    }
}

/// Remote futures exchange. Implementations are shared by all loops.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Whether the account holds long and short legs separately.
    async fn hedge_mode(&self) -> Result<bool>;
    async fn instrument_specs(&self, symbols: &[String]) -> Result<HashMap<String, InstrumentSpec>>;
    /// Most recent `limit` bars, oldest first; the last one is still forming.
    async fn klines(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>>;
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderReport>;
    async fn query_order(&self, symbol: &str, order_id: u64) -> Result<OrderReport>;
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()>;
    async fn positions(&self, symbol: &str) -> Result<Vec<PositionInfo>>;
    async fn ticker_price(&self, symbol: &str) -> Result<f64>;
    /// Release connections on shutdown.
    async fn close(&self) {}
}
