use crate::models::Interval;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

const DEFAULT_SYMBOLS: &str = "ETHUSDT,SOLUSDT,ADAUSDT,LINKUSDT,XRPUSDT";
const DEFAULT_INTERVALS: &str = "1h,4h,1d,1w";

/// Loop cadences. Defaults mirror the production bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cadence {
    pub scan_poll: Duration,
    /// Delay after a boundary before fetching, so the new bar exists.
    pub scan_settle: Duration,
    /// Idle after a pass so one boundary window triggers once.
    pub scan_cooldown: Duration,
    /// Seconds past the minute during which a boundary still counts.
    pub boundary_tolerance_secs: u32,
    pub sync_poll: Duration,
    pub early_exit_poll: Duration,
    pub error_backoff: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            scan_poll: Duration::from_secs(1),
            scan_settle: Duration::from_secs(3),
            scan_cooldown: Duration::from_secs(60),
            boundary_tolerance_secs: 15,
            sync_poll: Duration::from_secs(5),
            early_exit_poll: Duration::from_secs(1),
            error_backoff: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Exchange
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub recv_window_ms: u64,
    pub request_timeout: Duration,

    // Universe
    pub symbols: Vec<String>,
    pub intervals: Vec<Interval>,

    // Sizing
    pub investment_unit: f64,
    pub max_leverage: u32,
    pub margin_rates: HashMap<String, f64>,
    pub default_margin_rate: f64,

    // Notifications
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    // Persistence & liveness
    pub data_dir: PathBuf,
    pub heartbeat_interval: Duration,

    pub cadence: Cadence,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let opt = |key: &str| -> Option<String> {
            std::env::var(key).ok().filter(|s| !s.trim().is_empty())
        };

        let symbols = parse_list(&env("SYMBOLS", DEFAULT_SYMBOLS))
            .into_iter()
            .map(|s| s.to_uppercase())
            .collect();
        let intervals = parse_list(&env("INTERVALS", DEFAULT_INTERVALS))
            .iter()
            .filter_map(|s| Interval::from_str_loose(s))
            .collect();

        Config {
            api_key: env("BINANCE_API_KEY", ""),
            api_secret: env("BINANCE_API_SECRET", ""),
            base_url: env("BINANCE_BASE_URL", "https://fapi.binance.com"),
            recv_window_ms: env("RECV_WINDOW_MS", "5000").parse().unwrap_or(5000),
            request_timeout: Duration::from_secs(
                env("REQUEST_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            ),
            symbols,
            intervals,
            investment_unit: env("INVESTMENT_UNIT", "2").parse().unwrap_or(2.0),
            max_leverage: env("MAX_LEVERAGE", "20").parse().unwrap_or(20),
            margin_rates: parse_rates(&env("MARGIN_RATES", "BTCUSDT:0.004")),
            default_margin_rate: env("DEFAULT_MARGIN_RATE", "0.01")
                .parse()
                .unwrap_or(0.01),
            telegram_bot_token: opt("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: opt("TELEGRAM_CHAT_ID"),
            data_dir: PathBuf::from(env("DATA_DIR", "data")),
            heartbeat_interval: Duration::from_secs(
                env("HEARTBEAT_INTERVAL_SECS", "300").parse().unwrap_or(300),
            ),
            cadence: Cadence::default(),
            log_level: env("LOG_LEVEL", "INFO"),
        }
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(self)
    }

    /// Maintenance margin rate for a symbol, else the default.
    pub fn margin_rate(&self, symbol: &str) -> f64 {
        self.margin_rates
            .get(symbol)
            .copied()
            .unwrap_or(self.default_margin_rate)
    }

    pub fn orders_path(&self) -> PathBuf {
        self.data_dir.join("orders.json")
    }

    pub fn signals_path(&self) -> PathBuf {
        self.data_dir.join("signals.txt")
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.data_dir.join("heartbeat.txt")
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `SYM:rate,SYM:rate` pairs; malformed entries are skipped.
fn parse_rates(raw: &str) -> HashMap<String, f64> {
    parse_list(raw)
        .iter()
        .filter_map(|pair| {
            let (sym, rate) = pair.split_once(':')?;
            let rate = rate.trim().parse::<f64>().ok()?;
            Some((sym.trim().to_uppercase(), rate))
        })
        .collect()
}
