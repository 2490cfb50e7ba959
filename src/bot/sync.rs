use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::bot::{pause, BotContext};
use crate::exchange::OrderReport;
use crate::models::{OrderRole, OrderStatus};
use crate::notify::{messages, notify};
use crate::trading::{CancelOutcome, FillOutcome, OrderRecord};

/// Live exit prices further than this from the record count as a manual edit.
const PRICE_EDIT_TOLERANCE: f64 = 1e-5;

/// Polls every tracked order and folds exchange-side changes into state.
pub struct SyncLoop {
    ctx: BotContext,
}

impl SyncLoop {
    pub fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Order sync loop started");
        let cadence = self.ctx.config.cadence.clone();
        loop {
            let wait = match self.pass().await {
                Ok(()) => cadence.sync_poll,
                Err(e) => {
                    error!("Order sync pass failed: {:#}", e);
                    cadence.error_backoff
                }
            };
            self.ctx.heartbeat.beat();
            if pause(wait, &mut shutdown).await {
                break;
            }
        }
        info!("Order sync loop stopped");
    }

    /// One sweep over all tracked orders, then stale-exit cleanup.
    pub async fn pass(&self) -> Result<()> {
        let records = self.ctx.state.lock().await.snapshot();
        for record in &records {
            // Another loop may have resolved it since the snapshot.
            if self.ctx.state.lock().await.get(record.order_id).is_none() {
                continue;
            }
            match self
                .ctx
                .exchange
                .query_order(&record.symbol, record.order_id)
                .await
            {
                Ok(report) => self.apply(record, &report).await,
                Err(e) if e.is_resolved() => self.vanished(record).await,
                Err(e) => {
                    let context = format!("query {} #{}", record.symbol, record.order_id);
                    self.ctx.exchange_failure(&context, e).await;
                }
            }
        }
        self.cancel_stale_exits().await;
        Ok(())
    }

    async fn apply(&self, record: &OrderRecord, report: &OrderReport) {
        let notifier = self.ctx.notifier.as_ref();

        if report.status == record.status {
            if record.role.is_exit() && report.status == OrderStatus::New {
                self.check_price_edit(record, report).await;
            }
            return;
        }

        info!(
            "Order status | {} #{} {} | {} -> {}",
            record.symbol, record.order_id, record.role, record.status, report.status
        );

        if record.role == OrderRole::Entry && report.status == OrderStatus::Filled {
            match self.ctx.manager.on_filled(record).await {
                Ok(FillOutcome::Bracketed {
                    stop_loss,
                    take_profit,
                }) => info!(
                    "Bracket for {} #{}: stop {:?}, target {:?}",
                    record.symbol, record.order_id, stop_loss, take_profit
                ),
                Ok(outcome) => debug!("Fill of #{}: {:?}", record.order_id, outcome),
                Err(e) => {
                    error!(
                        "Fill handling for {} #{} failed, will retry: {:#}",
                        record.symbol, record.order_id, e
                    );
                    self.ctx
                        .alert(
                            &format!("fill handling {} #{}", record.symbol, record.order_id),
                            &e,
                        )
                        .await;
                }
            }
            return;
        }

        self.ctx
            .state
            .lock()
            .await
            .update_status(record.order_id, report.status);

        if record.role.is_exit() {
            match report.status {
                OrderStatus::Canceled => notify(notifier, &messages::manual_cancel(record)).await,
                OrderStatus::Filled => notify(notifier, &messages::exit_triggered(record)).await,
                _ => {}
            }
        } else if report.status.is_cancel_like() {
            notify(notifier, &messages::entry_canceled(record, report.status)).await;
        }

        if report.status.is_terminal() {
            self.ctx.state.lock().await.remove_order(record.order_id);
            info!("Stopped tracking {} #{}", record.symbol, record.order_id);
        }
    }

    async fn check_price_edit(&self, record: &OrderRecord, report: &OrderReport) {
        let live = report.working_price();
        if live <= 0.0 || (live - record.price).abs() <= PRICE_EDIT_TOLERANCE {
            return;
        }
        info!(
            "Price edited | {} #{} | {} -> {}",
            record.symbol, record.order_id, record.price, live
        );
        self.ctx.state.lock().await.update_price(record.order_id, live);
        notify(
            self.ctx.notifier.as_ref(),
            &messages::manual_price_edit(record, live),
        )
        .await;
    }

    async fn vanished(&self, record: &OrderRecord) {
        info!(
            "Order {} #{} no longer exists at the exchange, dropping",
            record.symbol, record.order_id
        );
        self.ctx.state.lock().await.remove_order(record.order_id);
        if record.role.is_exit() {
            notify(self.ctx.notifier.as_ref(), &messages::exit_vanished(record)).await;
        }
    }

    /// Exits left behind once a position is gone have nothing to protect.
    async fn cancel_stale_exits(&self) {
        let symbols = self.ctx.state.lock().await.symbols();
        for symbol in symbols {
            let exits: Vec<OrderRecord> = self
                .ctx
                .state
                .lock()
                .await
                .snapshot()
                .into_iter()
                .filter(|r| r.symbol == symbol && r.is_open_exit())
                .collect();
            if exits.is_empty() {
                continue;
            }

            let positions = match self.ctx.exchange.positions(&symbol).await {
                Ok(p) => p,
                Err(e) => {
                    self.ctx
                        .exchange_failure(&format!("position check {}", symbol), e)
                        .await;
                    continue;
                }
            };
            if positions.iter().any(|p| p.is_open()) {
                continue;
            }

            for exit in exits {
                match self.ctx.manager.cancel(exit.order_id).await {
                    Ok(CancelOutcome::Canceled) => {
                        info!(
                            "Canceled stale {} {} #{}",
                            symbol,
                            exit.role.label(),
                            exit.order_id
                        );
                        notify(
                            self.ctx.notifier.as_ref(),
                            &messages::stale_exit_canceled(&exit),
                        )
                        .await;
                    }
                    Ok(CancelOutcome::AlreadyResolved) => {
                        debug!("Stale exit #{} already resolved", exit.order_id)
                    }
                    Err(e) => {
                        let context = format!("cancel stale exit {} #{}", symbol, exit.order_id);
                        self.ctx.exchange_failure(&context, e).await;
                    }
                }
            }
        }
    }
}
