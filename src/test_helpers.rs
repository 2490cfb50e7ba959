use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::config::{Cadence, Config};
use crate::models::{Candle, Interval, OrderRole, Side, TradeProposal};
use crate::trading::OrderRecord;

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Hourly bar number `idx` from a fixed base, built from (open, high, low, close).
pub fn candle_at(idx: i64, (o, h, l, c): (f64, f64, f64, f64)) -> Candle {
    let open_time = base_time() + Duration::hours(idx);
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

pub fn default_test_config() -> Config {
    let mut margin_rates = HashMap::new();
    margin_rates.insert("BTCUSDT".to_string(), 0.004);
    Config {
        api_key: String::new(),
        api_secret: String::new(),
        base_url: "http://127.0.0.1:9".to_string(),
        recv_window_ms: 5000,
        request_timeout: std::time::Duration::from_secs(10),
        symbols: vec!["ETHUSDT".to_string()],
        intervals: vec![Interval::H1],
        investment_unit: 2.0,
        max_leverage: 20,
        margin_rates,
        default_margin_rate: 0.01,
        telegram_bot_token: None,
        telegram_chat_id: None,
        data_dir: std::env::temp_dir().join("wick-reversal-test"),
        heartbeat_interval: std::time::Duration::from_secs(300),
        cadence: Cadence::default(),
        log_level: "INFO".to_string(),
    }
}

pub fn proposal(symbol: &str, entry: f64, stop_loss: f64, take_profit: f64) -> TradeProposal {
    TradeProposal {
        symbol: symbol.to_string(),
        side: Side::Buy,
        interval: Interval::H1,
        entry,
        quantity: 0.358,
        stop_loss,
        take_profit,
        leverage: 18,
        sizing_leverage: 18,
        risk_pct: 4.47,
        reward_pct: 5.27,
        risk_reward: 1.18,
    }
}

/// A NEW record for `role`; exits are built off a matching entry.
pub fn order_record(order_id: u64, symbol: &str, role: OrderRole, price: f64) -> OrderRecord {
    let entry = OrderRecord::entry(order_id, &proposal(symbol, price, price * 0.95, price * 1.05));
    match role {
        OrderRole::Entry => entry,
        exit => OrderRecord::exit(order_id, exit, &entry, price),
    }
}
