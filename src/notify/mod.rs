pub mod messages;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;

const TELEGRAM_API: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Telegram rejected message (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound text channel for operator notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
    fn name(&self) -> &str;
}

/// Fire-and-forget delivery; failures are logged and never propagated.
pub async fn notify(notifier: &dyn Notifier, text: &str) {
    if let Err(e) = notifier.send(text).await {
        warn!("{} notification failed: {}", notifier.name(), e);
    }
}

/// Telegram when a bot token and chat id are configured, else the log.
pub fn from_config(cfg: &Config) -> Arc<dyn Notifier> {
    match (&cfg.telegram_bot_token, &cfg.telegram_chat_id) {
        (Some(token), Some(chat_id)) => match TelegramNotifier::new(token, chat_id) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                warn!("Telegram notifier unavailable ({}), logging notices instead", e);
                Arc::new(LogNotifier)
            }
        },
        _ => {
            info!("No Telegram credentials configured, notices go to the log");
            Arc::new(LogNotifier)
        }
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramNotifier {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        Ok(Self {
            client: Client::builder().timeout(SEND_TIMEOUT).build()?,
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API, self.token);
        let resp = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Writes notices to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!("[notice] {}", text.replace('\n', " | "));
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::default_test_config;

    #[test]
    fn falls_back_to_log_without_credentials() {
        let mut cfg = default_test_config();
        assert_eq!(from_config(&cfg).name(), "log");
        cfg.telegram_bot_token = Some("123:abc".into());
        assert_eq!(from_config(&cfg).name(), "log");
        cfg.telegram_chat_id = Some("42".into());
        assert_eq!(from_config(&cfg).name(), "telegram");
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        assert!(LogNotifier.send("line one\nline two").await.is_ok());
        notify(&LogNotifier, "hello").await;
    }
}
