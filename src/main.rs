use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use wick_reversal_bot::bot::SignalBot;
use wick_reversal_bot::config::Config;
use wick_reversal_bot::exchange::{BinanceClient, Exchange};
use wick_reversal_bot::notify;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.to_lowercase()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let exchange: Arc<dyn Exchange> = Arc::new(BinanceClient::new(&cfg)?);
    let notifier = notify::from_config(&cfg);
    let shared_config = cfg.shared();

    let bot = SignalBot::initialize(shared_config, exchange, notifier).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, finishing current iterations");
        let _ = shutdown_tx.send(true);
    });

    bot.run(shutdown_rx).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
