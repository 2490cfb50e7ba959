use thiserror::Error;

/// Binance: "Order does not exist."
pub const CODE_ORDER_NOT_FOUND: i64 = -2013;
/// Binance: "Unknown order sent." (already filled, canceled or expired)
pub const CODE_UNKNOWN_ORDER: i64 = -2011;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("rate limited (HTTP {status})")]
    RateLimited { status: u16 },
    #[error("order {order_id} not found")]
    OrderNotFound { order_id: u64 },
    #[error("order {order_id} is no longer active")]
    OrderInactive { order_id: u64 },
    #[error("exchange error {code}: {msg}")]
    Api { code: i64, msg: String },
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Http(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("API credentials are not configured")]
    MissingCredentials,
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

impl ExchangeError {
    /// Map a `{code,msg}` error body, resolving the order-specific codes.
    pub fn from_api(code: i64, msg: impl Into<String>, order_id: Option<u64>) -> Self {
        match (code, order_id) {
            (CODE_ORDER_NOT_FOUND, Some(order_id)) => ExchangeError::OrderNotFound { order_id },
            (CODE_UNKNOWN_ORDER, Some(order_id)) => ExchangeError::OrderInactive { order_id },
            _ => ExchangeError::Api {
                code,
                msg: msg.into(),
            },
        }
    }

    /// The order is already gone; for cleanup purposes this is success.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ExchangeError::OrderNotFound { .. } | ExchangeError::OrderInactive { .. }
        )
    }

    /// Worth retrying on a later loop iteration.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Timeout(_) | ExchangeError::RateLimited { .. } | ExchangeError::Http(_) => {
                true
            }
            ExchangeError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExchangeError::Timeout(e.to_string())
        } else if e.is_decode() {
            ExchangeError::Decode(e.to_string())
        } else {
            ExchangeError::Http(e.to_string())
        }
    }
}
