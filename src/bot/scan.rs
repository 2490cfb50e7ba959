use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bot::{pause, BotContext};
use crate::core::detector::{detect, SignalContext};
use crate::core::schedule::scan_boundary;
use crate::core::sizing::SizingParams;
use crate::models::{Interval, SignalKey};
use crate::notify::{messages, notify};

/// Bars fetched per pair: the last closed one and the forming one.
const BARS_PER_SCAN: usize = 2;

/// Scans every configured pair at bar-close boundaries.
pub struct ScanLoop {
    ctx: BotContext,
    /// Open time of the last bar that produced a signal, per pair.
    last_signal_bar: HashMap<(String, Interval), i64>,
}

impl ScanLoop {
    pub fn new(ctx: BotContext) -> Self {
        Self {
            ctx,
            last_signal_bar: HashMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Signal scan loop started");
        let cadence = self.ctx.config.cadence.clone();
        loop {
            if let Some(boundary) = scan_boundary(Utc::now(), cadence.boundary_tolerance_secs) {
                if pause(cadence.scan_settle, &mut shutdown).await {
                    break;
                }
                info!("{} boundary reached, scanning", boundary);
                let acted = self.pass(Utc::now()).await;
                info!("Scan pass complete: {} new signal(s) acted on", acted);
                self.ctx.heartbeat.beat();
                if pause(cadence.scan_cooldown, &mut shutdown).await {
                    break;
                }
            }
            self.ctx.heartbeat.beat();
            if pause(cadence.scan_poll, &mut shutdown).await {
                break;
            }
        }
        info!("Signal scan loop stopped");
    }

    /// Evaluate every configured pair at `now`. Per-pair failures are alerted
    /// and do not stop the pass. Returns the number of entries placed.
    pub async fn pass(&mut self, now: DateTime<Utc>) -> usize {
        let cfg = self.ctx.config.clone();
        let mut acted = 0;
        for symbol in &cfg.symbols {
            for &interval in &cfg.intervals {
                match self.evaluate(symbol, interval, now).await {
                    Ok(true) => acted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!("Scan failed | {} {} | {:#}", symbol, interval, e);
                        self.ctx
                            .alert(&format!("scan {} {}", symbol, interval), &e)
                            .await;
                    }
                }
            }
        }
        acted
    }

    async fn evaluate(&mut self, symbol: &str, interval: Interval, now: DateTime<Utc>) -> Result<bool> {
        let bars = self
            .ctx
            .exchange
            .klines(symbol, interval, BARS_PER_SCAN)
            .await
            .with_context(|| format!("Failed to fetch klines for {} {}", symbol, interval))?;
        let [.., prior, current] = bars.as_slice() else {
            debug!("{} {}: fewer than two bars", symbol, interval);
            return Ok(false);
        };
        if !prior.is_closed_at(now) {
            debug!("{} {}: last bar not closed yet", symbol, interval);
            return Ok(false);
        }

        let pair = (symbol.to_string(), interval);
        if self.last_signal_bar.get(&pair) == Some(&prior.open_time_ms()) {
            return Ok(false);
        }

        let spec = self.ctx.instruments.spec_or_fallback(symbol);
        let sizing = SizingParams::for_symbol(&self.ctx.config, symbol);
        let signal_ctx = SignalContext {
            symbol,
            interval,
            spec: &spec,
            sizing: &sizing,
        };
        let Some(proposal) = detect(prior, current, &signal_ctx, now) else {
            debug!("{} {}: no signal", symbol, interval);
            return Ok(false);
        };
        self.last_signal_bar.insert(pair, prior.open_time_ms());

        let key = SignalKey::new(symbol, interval, prior.open_time_ms());
        let fresh = self.ctx.state.lock().await.mark_processed(key.clone());
        notify(
            self.ctx.notifier.as_ref(),
            &messages::signal_seen(&proposal, !fresh),
        )
        .await;
        if !fresh {
            info!("Signal {} already processed", key);
            return Ok(false);
        }
        if !proposal.is_funded() {
            warn!(
                "Signal {} sized to zero quantity (unit {}), not trading",
                key, self.ctx.config.investment_unit
            );
            return Ok(false);
        }

        info!(
            "Signal {} | entry {} | stop {} | target {} | rr {}",
            key, proposal.entry, proposal.stop_loss, proposal.take_profit, proposal.risk_reward
        );
        Ok(self.ctx.manager.place_entry(&proposal).await.is_some())
    }
}
