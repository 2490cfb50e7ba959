//! Process lifecycle: startup verification, the three reconciliation loops,
//! and shutdown.

pub mod early_exit;
pub mod heartbeat;
pub mod scan;
pub mod sync;

pub use early_exit::EarlyExitLoop;
pub use heartbeat::Heartbeat;
pub use scan::ScanLoop;
pub use sync::SyncLoop;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::config::SharedConfig;
use crate::exchange::{Exchange, ExchangeError};
use crate::models::InstrumentCache;
use crate::notify::{messages, notify, Notifier};
use crate::trading::{OrderManager, SharedState, StateStore};

/// Handles every loop needs. Cheap to clone.
#[derive(Clone)]
pub struct BotContext {
    pub config: SharedConfig,
    pub exchange: Arc<dyn Exchange>,
    pub notifier: Arc<dyn Notifier>,
    pub state: SharedState,
    pub manager: Arc<OrderManager>,
    pub instruments: Arc<InstrumentCache>,
    pub heartbeat: Arc<Heartbeat>,
}

impl BotContext {
    pub(crate) async fn alert(&self, context: &str, err: &anyhow::Error) {
        notify(self.notifier.as_ref(), &messages::error_alert(context, err)).await;
    }

    /// Transient exchange failures are retried on the next pass quietly;
    /// anything else reaches the operator.
    pub(crate) async fn exchange_failure(&self, context: &str, err: ExchangeError) {
        if err.is_transient() {
            warn!("{} failed, retrying next pass | {}", context, err);
            return;
        }
        error!("{} failed | {}", context, err);
        self.alert(context, &anyhow::Error::new(err)).await;
    }
}

/// Sleep for `duration` unless shutdown is requested first. Returns `true`
/// when the loop should stop.
pub(crate) async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

pub struct SignalBot {
    ctx: BotContext,
}

impl SignalBot {
    /// Load and re-verify persisted state, then read account mode and
    /// instrument metadata. Any failure is alerted and aborts startup.
    pub async fn initialize(
        config: SharedConfig,
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        match Self::try_initialize(config, exchange, notifier.clone()).await {
            Ok(bot) => Ok(bot),
            Err(e) => {
                error!("Initialization failed: {:#}", e);
                notify(notifier.as_ref(), &messages::error_alert("initialization", &e)).await;
                Err(e)
            }
        }
    }

    async fn try_initialize(
        config: SharedConfig,
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let mut store = StateStore::load(config.orders_path(), config.signals_path())
            .context("Failed to load persisted state")?;
        store.reconcile_on_load(exchange.as_ref()).await;

        let hedge_mode = exchange
            .hedge_mode()
            .await
            .context("Failed to query position mode")?;
        info!(
            "Account position mode: {}",
            if hedge_mode { "hedge" } else { "one-way" }
        );

        let specs = exchange
            .instrument_specs(&config.symbols)
            .await
            .context("Failed to load instrument metadata")?;
        for symbol in config.symbols.iter().filter(|s| !specs.contains_key(*s)) {
            warn!("No instrument metadata for {}, using fallback precision", symbol);
        }
        let instruments = Arc::new(InstrumentCache::new(specs));

        let state: SharedState = Arc::new(Mutex::new(store));
        let manager = Arc::new(OrderManager::new(
            exchange.clone(),
            notifier.clone(),
            state.clone(),
            instruments.clone(),
            hedge_mode,
        ));
        let heartbeat = Arc::new(Heartbeat::new(
            config.heartbeat_path(),
            config.heartbeat_interval,
        ));

        Ok(Self {
            ctx: BotContext {
                config,
                exchange,
                notifier,
                state,
                manager,
                instruments,
                heartbeat,
            },
        })
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    pub fn scan_loop(&self) -> ScanLoop {
        ScanLoop::new(self.ctx.clone())
    }

    pub fn sync_loop(&self) -> SyncLoop {
        SyncLoop::new(self.ctx.clone())
    }

    pub fn early_exit_loop(&self) -> EarlyExitLoop {
        EarlyExitLoop::new(self.ctx.clone())
    }

    /// Run the three loops until `shutdown` flips to true, then save state
    /// and close the exchange connection.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let cfg = &self.ctx.config;
        info!("{}", "=".repeat(60));
        info!("Wick reversal bot starting up");
        info!("Symbols: {}", cfg.symbols.join(", "));
        let intervals: Vec<&str> = cfg.intervals.iter().map(|i| i.as_str()).collect();
        info!("Intervals: {}", intervals.join(", "));
        info!(
            "Investment unit: {} | max leverage: {}x",
            cfg.investment_unit, cfg.max_leverage
        );
        {
            let state = self.ctx.state.lock().await;
            info!(
                "Tracked orders: {} | processed signals: {}",
                state.len(),
                state.processed_count()
            );
        }
        info!("{}", "=".repeat(60));

        self.ctx.heartbeat.beat();

        let tasks = vec![
            ("scan", tokio::spawn(self.scan_loop().run(shutdown.clone()))),
            ("sync", tokio::spawn(self.sync_loop().run(shutdown.clone()))),
            (
                "early-exit",
                tokio::spawn(self.early_exit_loop().run(shutdown.clone())),
            ),
        ];
        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                error!("{} loop ended abnormally: {}", name, e);
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        info!("Shutting down...");
        self.ctx.state.lock().await.save();
        self.ctx.exchange.close().await;
        info!("Shutdown complete");
    }
}
