use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{error, info};

use crate::bot::{pause, BotContext};
use crate::notify::{messages, notify};
use crate::trading::{CancelOutcome, OrderRecord};

/// Cancels unfilled entries whose target traded before they filled.
pub struct EarlyExitLoop {
    ctx: BotContext,
}

impl EarlyExitLoop {
    pub fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Early-exit loop started");
        let cadence = self.ctx.config.cadence.clone();
        loop {
            let wait = match self.pass().await {
                Ok(_) => cadence.early_exit_poll,
                Err(e) => {
                    error!("Early-exit pass failed: {:#}", e);
                    cadence.error_backoff
                }
            };
            self.ctx.heartbeat.beat();
            if pause(wait, &mut shutdown).await {
                break;
            }
        }
        info!("Early-exit loop stopped");
    }

    /// Returns the number of entries canceled.
    pub async fn pass(&self) -> Result<usize> {
        let pending: Vec<OrderRecord> = self
            .ctx
            .state
            .lock()
            .await
            .snapshot()
            .into_iter()
            .filter(|r| r.is_pending_entry() && r.take_profit.is_some())
            .collect();

        let mut prices: HashMap<String, f64> = HashMap::new();
        let mut canceled = 0;
        for record in pending {
            let Some(take_profit) = record.take_profit else {
                continue;
            };
            let price = match prices.get(&record.symbol) {
                Some(p) => *p,
                None => match self.ctx.exchange.ticker_price(&record.symbol).await {
                    Ok(p) => {
                        prices.insert(record.symbol.clone(), p);
                        p
                    }
                    Err(e) => {
                        self.ctx
                            .exchange_failure(&format!("price fetch {}", record.symbol), e)
                            .await;
                        continue;
                    }
                },
            };
            if price < take_profit {
                continue;
            }

            match self.ctx.manager.cancel(record.order_id).await {
                Ok(CancelOutcome::Canceled) => {
                    canceled += 1;
                    info!(
                        "Canceled unfilled entry | target reached | {} #{} | price {} | target {}",
                        record.symbol, record.order_id, price, take_profit
                    );
                    notify(
                        self.ctx.notifier.as_ref(),
                        &messages::early_exit_canceled(&record, price, take_profit),
                    )
                    .await;
                }
                // Filled or canceled in the meantime; the sync loop settles it.
                Ok(CancelOutcome::AlreadyResolved) => info!(
                    "Entry {} #{} already resolved at the exchange, leaving it to sync",
                    record.symbol, record.order_id
                ),
                Err(e) => {
                    let context = format!("cancel entry {} #{}", record.symbol, record.order_id);
                    self.ctx.exchange_failure(&context, e).await;
                }
            }
        }
        Ok(canceled)
    }
}
