#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use wick_reversal_bot::bot::SignalBot;
use wick_reversal_bot::config::{Cadence, Config};
use wick_reversal_bot::exchange::{
    Exchange, ExchangeError, OrderKind, OrderReport, OrderRequest, PositionInfo, Result,
};
use wick_reversal_bot::models::{Candle, InstrumentSpec, Interval, OrderStatus};
use wick_reversal_bot::notify::{Notifier, NotifyError};

pub const SYMBOL: &str = "ETHUSDT";

/// Hourly bar number `idx` from a fixed base, built from (open, high, low, close).
pub fn candle_at(idx: i64, (o, h, l, c): (f64, f64, f64, f64)) -> Candle {
    let open_time = DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + Duration::hours(idx);
    Candle {
        open_time,
        close_time: open_time + Duration::hours(1) - Duration::milliseconds(1),
        open: o,
        high: h,
        low: l,
        close: c,
        volume: 100.0,
    }
}

/// Rejection bar followed by a confirming bar: entry 100.5, stop 96.01,
/// target 105.8, quantity 0.358 at 18x.
pub fn signal_bars() -> Vec<Candle> {
    vec![
        candle_at(0, (100.0, 110.0, 99.0, 100.5)),
        candle_at(1, (100.5, 105.0, 100.0, 101.0)),
    ]
}

/// A moment shortly after the second bar of [`signal_bars`] opened.
pub fn scan_time() -> DateTime<Utc> {
    candle_at(1, (0.0, 0.0, 0.0, 0.0)).open_time + Duration::seconds(5)
}

pub fn test_config(data_dir: &Path) -> Config {
    Config {
        api_key: String::new(),
        api_secret: String::new(),
        base_url: "http://127.0.0.1:9".to_string(),
        recv_window_ms: 5000,
        request_timeout: std::time::Duration::from_secs(10),
        symbols: vec![SYMBOL.to_string()],
        intervals: vec![Interval::H1],
        investment_unit: 2.0,
        max_leverage: 20,
        margin_rates: HashMap::from([("BTCUSDT".to_string(), 0.004)]),
        default_margin_rate: 0.01,
        telegram_bot_token: None,
        telegram_chat_id: None,
        data_dir: data_dir.to_path_buf(),
        heartbeat_interval: std::time::Duration::from_secs(300),
        cadence: Cadence::default(),
        log_level: "INFO".to_string(),
    }
}

#[derive(Default)]
pub struct MockState {
    pub next_id: u64,
    pub hedge_mode: bool,
    pub orders: HashMap<u64, OrderReport>,
    pub positions: HashMap<String, f64>,
    pub prices: HashMap<String, f64>,
    pub klines: HashMap<(String, Interval), Vec<Candle>>,
    pub placed: Vec<OrderRequest>,
    pub canceled: Vec<u64>,
    pub leverage_calls: Vec<(String, u32)>,
    pub fail_place: bool,
    pub fail_positions: bool,
    pub fail_queries: bool,
    /// Queries answered with a non-retryable API error.
    pub reject_queries: bool,
    pub fail_hedge_mode: bool,
    pub closed: bool,
}

/// In-memory exchange with scriptable order states.
#[derive(Default)]
pub struct MockExchange {
    pub state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Arc<Self> {
        let mock = Self::default();
        mock.state.lock().unwrap().next_id = 1000;
        Arc::new(mock)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_klines(&self, symbol: &str, interval: Interval, bars: Vec<Candle>) {
        self.with(|s| s.klines.insert((symbol.to_string(), interval), bars));
    }

    pub fn set_status(&self, order_id: u64, status: OrderStatus) {
        self.with(|s| {
            if let Some(o) = s.orders.get_mut(&order_id) {
                o.status = status;
            }
        });
    }

    pub fn set_stop_price(&self, order_id: u64, stop_price: f64) {
        self.with(|s| {
            if let Some(o) = s.orders.get_mut(&order_id) {
                o.stop_price = stop_price;
            }
        });
    }

    pub fn set_position(&self, symbol: &str, amount: f64) {
        self.with(|s| s.positions.insert(symbol.to_string(), amount));
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.with(|s| s.prices.insert(symbol.to_string(), price));
    }

    /// Make the exchange forget an order entirely.
    pub fn forget(&self, order_id: u64) {
        self.with(|s| s.orders.remove(&order_id));
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.with(|s| s.placed.clone())
    }

    pub fn status_of(&self, order_id: u64) -> Option<OrderStatus> {
        self.with(|s| s.orders.get(&order_id).map(|o| o.status))
    }

    /// Register an order the bot did not place through this mock.
    pub fn insert_order(&self, order_id: u64, status: OrderStatus) {
        self.with(|s| {
            s.orders.insert(
                order_id,
                OrderReport {
                    order_id,
                    symbol: SYMBOL.to_string(),
                    status,
                    price: 100.0,
                    stop_price: 0.0,
                    orig_qty: 1.0,
                    executed_qty: 0.0,
                },
            )
        });
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn hedge_mode(&self) -> Result<bool> {
        self.with(|s| {
            if s.fail_hedge_mode {
                Err(ExchangeError::Timeout("position mode".into()))
            } else {
                Ok(s.hedge_mode)
            }
        })
    }

    async fn instrument_specs(&self, symbols: &[String]) -> Result<HashMap<String, InstrumentSpec>> {
        Ok(symbols
            .iter()
            .map(|s| (s.clone(), InstrumentSpec::from_filters(Some(0.001), Some(0.01))))
            .collect())
    }

    async fn klines(&self, symbol: &str, interval: Interval, _limit: usize) -> Result<Vec<Candle>> {
        self.with(|s| {
            s.klines
                .get(&(symbol.to_string(), interval))
                .cloned()
                .ok_or_else(|| ExchangeError::Http("no klines scripted".into()))
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.with(|s| s.leverage_calls.push((symbol.to_string(), leverage)));
        Ok(())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderReport> {
        self.with(|s| {
            if s.fail_place {
                return Err(ExchangeError::Api {
                    code: -2019,
                    msg: "Margin is insufficient.".into(),
                });
            }
            s.next_id += 1;
            let (price, stop_price) = match request.kind {
                OrderKind::Limit { price } => (price, 0.0),
                OrderKind::StopMarket { stop_price } => (0.0, stop_price),
            };
            let report = OrderReport {
                order_id: s.next_id,
                symbol: request.symbol.clone(),
                status: OrderStatus::New,
                price,
                stop_price,
                orig_qty: request.quantity.unwrap_or(0.0),
                executed_qty: 0.0,
            };
            s.orders.insert(report.order_id, report.clone());
            s.placed.push(request.clone());
            Ok(report)
        })
    }

    async fn query_order(&self, _symbol: &str, order_id: u64) -> Result<OrderReport> {
        self.with(|s| {
            if s.fail_queries {
                return Err(ExchangeError::Timeout("query".into()));
            }
            if s.reject_queries {
                return Err(ExchangeError::Api {
                    code: -1102,
                    msg: "Mandatory parameter was not sent.".into(),
                });
            }
            s.orders
                .get(&order_id)
                .cloned()
                .ok_or(ExchangeError::OrderNotFound { order_id })
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<()> {
        self.with(|s| match s.orders.get_mut(&order_id) {
            None => Err(ExchangeError::OrderNotFound { order_id }),
            Some(o) if o.status.is_terminal() => Err(ExchangeError::OrderInactive { order_id }),
            Some(o) => {
                o.status = OrderStatus::Canceled;
                s.canceled.push(order_id);
                Ok(())
            }
        })
    }

    async fn positions(&self, symbol: &str) -> Result<Vec<PositionInfo>> {
        self.with(|s| {
            if s.fail_positions {
                return Err(ExchangeError::Timeout("positions".into()));
            }
            Ok(vec![PositionInfo {
                symbol: symbol.to_string(),
                position_side: "BOTH".to_string(),
                amount: s.positions.get(symbol).copied().unwrap_or(0.0),
                entry_price: 0.0,
            }])
        })
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        self.with(|s| {
            s.prices
                .get(symbol)
                .copied()
                .ok_or_else(|| ExchangeError::Http("no price scripted".into()))
        })
    }

    async fn close(&self) {
        self.with(|s| s.closed = true);
    }
}

/// Keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> std::result::Result<(), NotifyError> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub async fn start_bot(
    data_dir: &Path,
    exchange: Arc<MockExchange>,
) -> (anyhow::Result<SignalBot>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let bot = SignalBot::initialize(
        test_config(data_dir).shared(),
        exchange,
        notifier.clone(),
    )
    .await;
    (bot, notifier)
}
