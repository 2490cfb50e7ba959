use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::exchange::{self, Exchange, ExchangeError, OrderRequest};
use crate::models::{InstrumentCache, OrderRole, PositionSide, Side, TradeProposal};
use crate::notify::{messages, notify, Notifier};
use crate::trading::{OrderRecord, SharedState};

/// What [`OrderManager::on_filled`] did with a filled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The fill was already handled by an earlier call.
    AlreadyHandled,
    /// No live position; the entry was dropped without exits.
    NoPosition,
    /// Exit orders that were accepted by the exchange.
    Bracketed {
        stop_loss: Option<u64>,
        take_profit: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    /// The exchange no longer knew the order as active.
    AlreadyResolved,
}

/// Sole writer of order records: places entries, brackets fills, cancels.
pub struct OrderManager {
    exchange: Arc<dyn Exchange>,
    notifier: Arc<dyn Notifier>,
    state: SharedState,
    instruments: Arc<InstrumentCache>,
    hedge_mode: bool,
}

impl OrderManager {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
        state: SharedState,
        instruments: Arc<InstrumentCache>,
        hedge_mode: bool,
    ) -> Self {
        Self {
            exchange,
            notifier,
            state,
            instruments,
            hedge_mode,
        }
    }

    /// Set leverage and submit the limit entry. Failures are reported and the
    /// proposal is dropped; nothing is retried.
    pub async fn place_entry(&self, proposal: &TradeProposal) -> Option<u64> {
        let spec = self.instruments.spec_or_fallback(&proposal.symbol);
        debug!("Placing entry {} @ {}", proposal.symbol, proposal.entry);

        if let Err(e) = self
            .exchange
            .set_leverage(&proposal.symbol, proposal.leverage)
            .await
        {
            error!("Set leverage failed | {} | {}", proposal.symbol, e);
            let text = messages::placement_failed(&proposal.symbol, &e.to_string());
            notify(self.notifier.as_ref(), &text).await;
            return None;
        }

        let request = OrderRequest::limit(
            &proposal.symbol,
            Side::Buy,
            proposal.entry,
            proposal.quantity,
            spec.price_precision,
        )
        .in_hedge_mode(self.hedge_mode, PositionSide::Long);

        match self.exchange.place_order(&request).await {
            Ok(report) => {
                let record = OrderRecord::entry(report.order_id, proposal);
                self.state.lock().await.insert_order(record);
                info!(
                    "Entry placed | {} {} | #{} | {} x {} @ {}x",
                    proposal.symbol,
                    proposal.interval,
                    report.order_id,
                    proposal.quantity,
                    proposal.entry,
                    proposal.leverage
                );
                let text = messages::new_trade(proposal, &spec, report.order_id);
                notify(self.notifier.as_ref(), &text).await;
                Some(report.order_id)
            }
            Err(e) => {
                error!("Entry placement failed | {} | {}", proposal.symbol, e);
                let text = messages::placement_failed(&proposal.symbol, &e.to_string());
                notify(self.notifier.as_ref(), &text).await;
                None
            }
        }
    }

    /// Handle an entry observed FILLED. Idempotent: only the first call per
    /// order does anything. If the position query fails the claim is released
    /// and the error returned, so a later pass retries.
    pub async fn on_filled(&self, entry: &OrderRecord) -> Result<FillOutcome> {
        let Some(previous) = self.state.lock().await.claim_fill(entry.order_id) else {
            return Ok(FillOutcome::AlreadyHandled);
        };

        let positions = match self.exchange.positions(&entry.symbol).await {
            Ok(p) => p,
            Err(e) => {
                self.state.lock().await.release_fill(entry.order_id, previous);
                return Err(e).with_context(|| format!("query position for {}", entry.symbol));
            }
        };

        if !positions.iter().any(|p| p.is_open()) {
            self.state.lock().await.remove_order(entry.order_id);
            info!(
                "Entry {} #{} filled but no position remains, dropping",
                entry.symbol, entry.order_id
            );
            let text = messages::filled_without_position(entry);
            notify(self.notifier.as_ref(), &text).await;
            return Ok(FillOutcome::NoPosition);
        }

        info!("Entry filled | {} #{}", entry.symbol, entry.order_id);
        notify(self.notifier.as_ref(), &messages::entry_filled(entry)).await;

        let spec = self.instruments.spec_or_fallback(&entry.symbol);
        let stop_loss = match entry.stop_loss {
            Some(stop) => {
                let request =
                    OrderRequest::stop_close_all(&entry.symbol, Side::Sell, stop, spec.price_precision)
                        .in_hedge_mode(self.hedge_mode, PositionSide::Long);
                self.place_exit(entry, OrderRole::StopLoss, &request).await
            }
            None => None,
        };
        let take_profit = match entry.take_profit {
            Some(target) => {
                let request = OrderRequest::limit(
                    &entry.symbol,
                    Side::Sell,
                    target,
                    entry.quantity,
                    spec.price_precision,
                )
                .in_hedge_mode(self.hedge_mode, PositionSide::Long);
                self.place_exit(entry, OrderRole::TakeProfit, &request).await
            }
            None => None,
        };

        self.state.lock().await.remove_order(entry.order_id);
        Ok(FillOutcome::Bracketed {
            stop_loss,
            take_profit,
        })
    }

    async fn place_exit(
        &self,
        entry: &OrderRecord,
        role: OrderRole,
        request: &OrderRequest,
    ) -> Option<u64> {
        match self.exchange.place_order(request).await {
            Ok(report) => {
                let record = OrderRecord::exit(report.order_id, role, entry, request.price());
                self.state.lock().await.insert_order(record);
                info!(
                    "{} placed | {} #{} @ {}",
                    role.label(),
                    entry.symbol,
                    report.order_id,
                    request.price()
                );
                Some(report.order_id)
            }
            Err(e) => {
                error!(
                    "{} creation failed | {} | entry #{} | {}",
                    role.label(),
                    entry.symbol,
                    entry.order_id,
                    e
                );
                let text = messages::exit_creation_failed(entry, role.label(), &e.to_string());
                notify(self.notifier.as_ref(), &text).await;
                None
            }
        }
    }

    /// Cancel a tracked order. "Not found" and "no longer active" count as
    /// done. An unknown order is dropped; an inactive one is kept so the sync
    /// loop can settle how it ended (a fill still needs its bracket).
    pub async fn cancel(&self, order_id: u64) -> exchange::Result<CancelOutcome> {
        let symbol = match self.state.lock().await.get(order_id) {
            Some(record) => record.symbol.clone(),
            None => return Ok(CancelOutcome::AlreadyResolved),
        };

        match self.exchange.cancel_order(&symbol, order_id).await {
            Ok(()) => {
                self.state.lock().await.remove_order(order_id);
                Ok(CancelOutcome::Canceled)
            }
            Err(e @ ExchangeError::OrderNotFound { .. }) => {
                debug!("Cancel {} #{}: {}", symbol, order_id, e);
                self.state.lock().await.remove_order(order_id);
                Ok(CancelOutcome::AlreadyResolved)
            }
            Err(e) if e.is_resolved() => {
                debug!("Cancel {} #{}: {}", symbol, order_id, e);
                Ok(CancelOutcome::AlreadyResolved)
            }
            Err(e) => Err(e),
        }
    }
}
