//! Operator notice texts, one function per lifecycle event.

use chrono::Utc;

use crate::models::{InstrumentSpec, OrderStatus, TradeProposal};
use crate::trading::OrderRecord;

const HEADER: &str = "[wick-reversal]";

fn record_lines(record: &OrderRecord) -> String {
    format!(
        "Symbol: {}\nOrder: {} #{}\nPrice: {}",
        record.symbol,
        record.role.label(),
        record.order_id,
        record.price
    )
}

pub fn signal_seen(proposal: &TradeProposal, already_processed: bool) -> String {
    let note = if already_processed {
        "already acted on"
    } else if !proposal.is_funded() {
        "quantity rounds to zero"
    } else {
        "new"
    };
    format!(
        "{HEADER} Signal seen {} {}\nClose: {}\nStatus: {}",
        proposal.symbol, proposal.interval, proposal.entry, note
    )
}

pub fn new_trade(proposal: &TradeProposal, spec: &InstrumentSpec, order_id: u64) -> String {
    format!(
        "{HEADER} New trade {}\nInterval: {}\nEntry: {}\nStop: {} (-{:.2}%)\nTarget: {} (+{:.2}%)\nRisk/reward: 1:{}\nLeverage: {}x\nQuantity: {}\nOrder: #{}",
        proposal.symbol,
        proposal.interval,
        spec.format_price(proposal.entry),
        spec.format_price(proposal.stop_loss),
        proposal.risk_pct,
        spec.format_price(proposal.take_profit),
        proposal.reward_pct,
        proposal.risk_reward,
        proposal.leverage,
        proposal.quantity,
        order_id
    )
}

pub fn placement_failed(symbol: &str, reason: &str) -> String {
    format!("{HEADER} Entry placement failed {symbol}\nReason: {reason}")
}

pub fn entry_filled(record: &OrderRecord) -> String {
    format!("{HEADER} Entry filled\n{}", record_lines(record))
}

pub fn filled_without_position(record: &OrderRecord) -> String {
    format!(
        "{HEADER} Entry filled but no position found, no exits created\n{}",
        record_lines(record)
    )
}

pub fn exit_creation_failed(entry: &OrderRecord, role_label: &str, reason: &str) -> String {
    format!(
        "{HEADER} Could not create {} for {} (entry #{})\nReason: {}",
        role_label, entry.symbol, entry.order_id, reason
    )
}

pub fn exit_triggered(record: &OrderRecord) -> String {
    let what = match record.role {
        crate::models::OrderRole::TakeProfit => "Take-profit triggered",
        _ => "Stop-loss triggered",
    };
    format!("{HEADER} {what} {}\nPrice: {}\nOrder: #{}", record.symbol, record.price, record.order_id)
}

pub fn manual_cancel(record: &OrderRecord) -> String {
    format!("{HEADER} Order manually canceled\n{}", record_lines(record))
}

pub fn entry_canceled(record: &OrderRecord, status: OrderStatus) -> String {
    format!(
        "{HEADER} Entry closed without a fill ({})\n{}",
        status.as_str(),
        record_lines(record)
    )
}

pub fn manual_price_edit(record: &OrderRecord, new_price: f64) -> String {
    format!(
        "{HEADER} Order price manually changed\n{}\nNew price: {}",
        record_lines(record),
        new_price
    )
}

pub fn exit_vanished(record: &OrderRecord) -> String {
    format!(
        "{HEADER} Exit order no longer exists at the exchange\n{}",
        record_lines(record)
    )
}

pub fn stale_exit_canceled(record: &OrderRecord) -> String {
    format!(
        "{HEADER} Canceled {} {} with no open position\nOrder: #{}",
        record.symbol,
        record.role.label(),
        record.order_id
    )
}

pub fn early_exit_canceled(record: &OrderRecord, price: f64, take_profit: f64) -> String {
    format!(
        "{HEADER} Unfilled entry canceled {}: price {} reached target {} first\nOrder: #{}",
        record.symbol, price, take_profit, record.order_id
    )
}

pub fn error_alert(context: &str, err: &anyhow::Error) -> String {
    let detail: String = format!("{err:#}").chars().take(400).collect();
    format!(
        "{HEADER} Error\nTime: {}\nContext: {}\nDetail: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        context,
        detail
    )
}
