use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::exchange::{
    Exchange, ExchangeError, OrderKind, OrderReport, OrderRequest, PositionInfo, Result,
};
use crate::models::instrument::{format_decimal, round_to};
use crate::models::{Candle, InstrumentSpec, Interval, OrderStatus};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionModeResponse {
    dual_side_position: bool,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<RawSymbol>,
}

#[derive(Debug, Deserialize)]
struct RawSymbol {
    symbol: String,
    #[serde(default)]
    filters: Vec<RawFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFilter {
    filter_type: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    step_size: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    tick_size: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    order_id: u64,
    symbol: String,
    status: OrderStatus,
    #[serde(default, deserialize_with = "de_f64")]
    price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    stop_price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    orig_qty: f64,
    #[serde(default, deserialize_with = "de_f64")]
    executed_qty: f64,
}

impl From<RawOrder> for OrderReport {
    fn from(raw: RawOrder) -> Self {
        OrderReport {
            order_id: raw.order_id,
            symbol: raw.symbol,
            status: raw.status,
            price: raw.price,
            stop_price: raw.stop_price,
            orig_qty: raw.orig_qty,
            executed_qty: raw.executed_qty,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    symbol: String,
    #[serde(default)]
    position_side: String,
    #[serde(deserialize_with = "de_f64")]
    position_amt: f64,
    #[serde(default, deserialize_with = "de_f64")]
    entry_price: f64,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(deserialize_with = "de_f64")]
    price: f64,
}

/// Binance returns most numbers as strings.
fn de_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        Str(String),
        Float(f64),
    }
    match Num::deserialize(d)? {
        Num::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Num::Float(f) => Ok(f),
    }
}

fn de_opt_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    de_f64(d).map(Some)
}

/// USDⓈ-M futures REST client.
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    last_request: Mutex<Option<Instant>>,
}

impl BinanceClient {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            api_secret: cfg.api_secret.clone(),
            recv_window_ms: cfg.recv_window_ms,
            last_request: Mutex::new(None),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn sign_params(&self, mut params: Vec<(&str, String)>) -> Result<String> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(ExchangeError::MissingCredentials);
        }
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
        if self.recv_window_ms > 0 {
            params.push(("recvWindow", self.recv_window_ms.to_string()));
        }
        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| ExchangeError::Decode(e.to_string()))?;
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Decode(format!("failed to init signer: {e}")))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{query}&signature={signature}"))
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Vec<(&str, String)>,
        order_id: Option<u64>,
    ) -> Result<T> {
        let query = self.sign_params(params)?;
        self.rate_limit().await;
        debug!("{} {}", method, path);
        let resp = self
            .client
            .request(method, format!("{}{}?{}", self.base_url, path, query))
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::decode(resp, order_id).await
    }

    async fn public<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        self.rate_limit().await;
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .send()
            .await?;
        Self::decode(resp, None).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response, order_id: Option<u64>) -> Result<T> {
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| ExchangeError::Decode(format!("{e}: {}", truncate(&body))));
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            return Err(ExchangeError::RateLimited {
                status: status.as_u16(),
            });
        }
        match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => Err(ExchangeError::from_api(err.code, err.msg, order_id)),
            Err(_) => Err(ExchangeError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            }),
        }
    }

    fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
        let price = |p: f64| format_decimal(round_to(p, request.price_precision));
        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_str().to_string()),
        ];
        match request.kind {
            OrderKind::Limit { price: limit } => {
                params.push(("type", "LIMIT".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("price", price(limit)));
            }
            OrderKind::StopMarket { stop_price } => {
                params.push(("type", "STOP_MARKET".to_string()));
                params.push(("stopPrice", price(stop_price)));
            }
        }
        if let Some(qty) = request.quantity {
            params.push(("quantity", format_decimal(qty)));
        }
        if request.close_position {
            params.push(("closePosition", "true".to_string()));
        }
        if let Some(side) = request.position_side {
            params.push(("positionSide", side.as_str().to_string()));
        }
        params
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(300).collect()
}

fn parse_kline(row: &[serde_json::Value]) -> Option<Candle> {
    if row.len() < 7 {
        return None;
    }
    let num = |v: &serde_json::Value| -> Option<f64> {
        v.as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| v.as_f64())
    };
    Some(Candle {
        open_time: DateTime::from_timestamp_millis(row[0].as_i64()?)?,
        open: num(&row[1])?,
        high: num(&row[2])?,
        low: num(&row[3])?,
        close: num(&row[4])?,
        volume: num(&row[5])?,
        close_time: DateTime::from_timestamp_millis(row[6].as_i64()?)?,
    })
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn hedge_mode(&self) -> Result<bool> {
        let resp: PositionModeResponse = self
            .signed(Method::GET, "/fapi/v1/positionSide/dual", vec![], None)
            .await?;
        Ok(resp.dual_side_position)
    }

    async fn instrument_specs(&self, symbols: &[String]) -> Result<HashMap<String, InstrumentSpec>> {
        let info: ExchangeInfoResponse = self.public("/fapi/v1/exchangeInfo", &[]).await?;
        let specs = info
            .symbols
            .into_iter()
            .filter(|s| symbols.contains(&s.symbol))
            .map(|s| {
                let step = s
                    .filters
                    .iter()
                    .find(|f| f.filter_type == "LOT_SIZE")
                    .and_then(|f| f.step_size);
                let tick = s
                    .filters
                    .iter()
                    .find(|f| f.filter_type == "PRICE_FILTER")
                    .and_then(|f| f.tick_size);
                (s.symbol, InstrumentSpec::from_filters(step, tick))
            })
            .collect();
        Ok(specs)
    }

    async fn klines(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .public(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        rows.iter()
            .map(|row| {
                parse_kline(row)
                    .ok_or_else(|| ExchangeError::Decode(format!("malformed kline for {symbol}")))
            })
            .collect()
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let _: serde_json::Value = self
            .signed(
                Method::POST,
                "/fapi/v1/leverage",
                vec![
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
                None,
            )
            .await?;
        Ok(())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderReport> {
        let raw: RawOrder = self
            .signed(Method::POST, "/fapi/v1/order", Self::order_params(request), None)
            .await?;
        Ok(raw.into())
    }

    async fn query_order(&self, symbol: &str, order_id: u64) -> Result<OrderReport> {
        let raw: RawOrder = self
            .signed(
                Method::GET,
                "/fapi/v1/order",
                vec![
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
                Some(order_id),
            )
            .await?;
        Ok(raw.into())
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()> {
        let _: serde_json::Value = self
            .signed(
                Method::DELETE,
                "/fapi/v1/order",
                vec![
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
                Some(order_id),
            )
            .await?;
        Ok(())
    }

    async fn positions(&self, symbol: &str) -> Result<Vec<PositionInfo>> {
        let raw: Vec<RawPosition> = self
            .signed(
                Method::GET,
                "/fapi/v2/positionRisk",
                vec![("symbol", symbol.to_string())],
                None,
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|p| PositionInfo {
                symbol: p.symbol,
                position_side: p.position_side,
                amount: p.position_amt,
                entry_price: p.entry_price,
            })
            .collect())
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        let ticker: TickerResponse = self
            .public("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(ticker.price)
    }
}
