//! Durable store for tracked orders and processed signals.
//!
//! Both collections are written to their own file, each replaced atomically
//! (temp file, fsync, rename) on every mutation, so a torn write of one can
//! never corrupt the other. Persistence failures are logged and never
//! surface into the order lifecycle.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::exchange::Exchange;
use crate::models::{OrderRole, OrderStatus, SignalKey};
use crate::trading::OrderRecord;

/// Store handle shared by the loops. Hold the lock only across local work.
pub type SharedState = Arc<Mutex<StateStore>>;

#[derive(Debug)]
pub struct StateStore {
    orders: BTreeMap<u64, OrderRecord>,
    processed: BTreeSet<SignalKey>,
    orders_path: PathBuf,
    signals_path: PathBuf,
}

impl StateStore {
    /// Empty store; nothing is written until the first mutation.
    pub fn new(orders_path: impl Into<PathBuf>, signals_path: impl Into<PathBuf>) -> Self {
        Self {
            orders: BTreeMap::new(),
            processed: BTreeSet::new(),
            orders_path: orders_path.into(),
            signals_path: signals_path.into(),
        }
    }

    /// Load both files. Missing files mean a fresh start; unreadable ones are
    /// an error so a corrupt signal set can't cause duplicate orders.
    pub fn load(orders_path: impl Into<PathBuf>, signals_path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(orders_path, signals_path);

        if store.orders_path.exists() {
            let content = fs::read_to_string(&store.orders_path)
                .with_context(|| format!("Failed to read {}", store.orders_path.display()))?;
            if !content.trim().is_empty() {
                store.orders = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", store.orders_path.display()))?;
            }
        }

        if store.signals_path.exists() {
            let content = fs::read_to_string(&store.signals_path)
                .with_context(|| format!("Failed to read {}", store.signals_path.display()))?;
            for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                match line.parse::<SignalKey>() {
                    Ok(key) => {
                        store.processed.insert(key);
                    }
                    Err(e) => warn!("Skipping malformed signal line {:?}: {}", line, e),
                }
            }
        }

        info!(
            "Loaded {} order(s) and {} processed signal(s)",
            store.orders.len(),
            store.processed.len()
        );
        Ok(store)
    }

    /// Re-verify every loaded order against the exchange. Locally terminal,
    /// exchange-terminal and unknown orders are dropped; an order whose query
    /// fails for any other reason is kept for the sync loop to retry.
    pub async fn reconcile_on_load(&mut self, exchange: &dyn Exchange) -> usize {
        let mut dropped = 0;
        let records: Vec<OrderRecord> = self.orders.values().cloned().collect();

        for record in records {
            if record.status.is_terminal() {
                info!("Dropping terminal order {} #{} ({})", record.symbol, record.order_id, record.status);
                self.orders.remove(&record.order_id);
                dropped += 1;
                continue;
            }
            match exchange.query_order(&record.symbol, record.order_id).await {
                Ok(report) if report.status.is_terminal() => {
                    if record.role == OrderRole::Entry && report.status == OrderStatus::Filled {
                        warn!(
                            "Entry {} #{} filled while offline; no exits will be created for it",
                            record.symbol, record.order_id
                        );
                    } else {
                        info!(
                            "Dropping finished order {} #{} ({})",
                            record.symbol, record.order_id, report.status
                        );
                    }
                    self.orders.remove(&record.order_id);
                    dropped += 1;
                }
                Ok(_) => debug!("Order {} #{} verified", record.symbol, record.order_id),
                Err(e) if e.is_resolved() => {
                    info!("Order {} #{} unknown to exchange, dropping", record.symbol, record.order_id);
                    self.orders.remove(&record.order_id);
                    dropped += 1;
                }
                Err(e) => warn!(
                    "Could not verify order {} #{} ({}), keeping it",
                    record.symbol, record.order_id, e
                ),
            }
        }

        if dropped > 0 {
            self.save_orders();
        }
        info!("Tracking {} order(s) after verification", self.orders.len());
        dropped
    }

    pub fn insert_order(&mut self, record: OrderRecord) {
        self.orders.insert(record.order_id, record);
        self.save_orders();
    }

    /// Returns the previous status if the order is tracked.
    pub fn update_status(&mut self, order_id: u64, status: OrderStatus) -> Option<OrderStatus> {
        let record = self.orders.get_mut(&order_id)?;
        let previous = record.status;
        record.status = status;
        record.updated_at = Utc::now();
        self.save_orders();
        Some(previous)
    }

    pub fn update_price(&mut self, order_id: u64, price: f64) -> bool {
        let Some(record) = self.orders.get_mut(&order_id) else {
            return false;
        };
        record.price = price;
        record.updated_at = Utc::now();
        self.save_orders();
        true
    }

    pub fn remove_order(&mut self, order_id: u64) -> Option<OrderRecord> {
        let removed = self.orders.remove(&order_id);
        if removed.is_some() {
            self.save_orders();
        }
        removed
    }

    /// Mark a tracked entry FILLED, once. `None` means someone already
    /// claimed it (or it is not an entry), so the caller must do nothing.
    pub fn claim_fill(&mut self, order_id: u64) -> Option<OrderStatus> {
        let record = self.orders.get(&order_id)?;
        if record.role != OrderRole::Entry || record.status == OrderStatus::Filled {
            return None;
        }
        self.update_status(order_id, OrderStatus::Filled)
    }

    /// Undo [`claim_fill`](Self::claim_fill) so the fill is retried.
    pub fn release_fill(&mut self, order_id: u64, previous: OrderStatus) {
        if self.orders.get(&order_id).map(|r| r.status) == Some(OrderStatus::Filled) {
            self.update_status(order_id, previous);
        }
    }

    /// Record a signal as acted upon. `false` if it already was.
    pub fn mark_processed(&mut self, key: SignalKey) -> bool {
        let fresh = self.processed.insert(key);
        if fresh {
            self.save_signals();
        }
        fresh
    }

    pub fn is_processed(&self, key: &SignalKey) -> bool {
        self.processed.contains(key)
    }

    pub fn get(&self, order_id: u64) -> Option<&OrderRecord> {
        self.orders.get(&order_id)
    }

    pub fn snapshot(&self) -> Vec<OrderRecord> {
        self.orders.values().cloned().collect()
    }

    /// Distinct symbols with at least one tracked order.
    pub fn symbols(&self) -> BTreeSet<String> {
        self.orders.values().map(|r| r.symbol.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn save(&self) {
        self.save_orders();
        self.save_signals();
    }

    fn save_orders(&self) {
        let result = serde_json::to_string_pretty(&self.orders)
            .context("Failed to serialize orders")
            .and_then(|json| write_atomic(&self.orders_path, json.as_bytes()));
        if let Err(e) = result {
            error!("Order state save failed: {:#}", e);
        }
    }

    fn save_signals(&self) {
        let mut content = String::new();
        for key in &self.processed {
            content.push_str(&key.to_string());
            content.push('\n');
        }
        if let Err(e) = write_atomic(&self.signals_path, content.as_bytes()) {
            error!("Signal state save failed: {:#}", e);
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)
        .with_context(|| format!("Failed to create {}", temp_path.display()))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interval;
    use crate::test_helpers::order_record;

    fn store_in(dir: &tempfile::TempDir) -> StateStore {
        StateStore::new(dir.path().join("orders.json"), dir.path().join("signals.txt"))
    }

    #[test]
    fn orders_and_signals_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let rec = order_record(5, "ETHUSDT", OrderRole::Entry, 100.5);
        store.insert_order(rec.clone());
        assert!(store.mark_processed(SignalKey::new("SOLUSDT", Interval::H4, 2_000)));
        assert!(store.mark_processed(SignalKey::new("ETHUSDT", Interval::H1, 1_000)));

        let loaded =
            StateStore::load(dir.path().join("orders.json"), dir.path().join("signals.txt")).unwrap();
        assert_eq!(loaded.get(5), Some(&rec));
        assert!(loaded.is_processed(&SignalKey::new("ETHUSDT", Interval::H1, 1_000)));
        assert_eq!(loaded.processed_count(), 2);

        let lines = fs::read_to_string(dir.path().join("signals.txt")).unwrap();
        assert_eq!(lines, "ETHUSDT|1h|1000\nSOLUSDT|4h|2000\n");
        assert!(!dir.path().join("orders.tmp").exists());
    }

    #[test]
    fn marking_twice_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let key = SignalKey::new("ETHUSDT", Interval::H1, 1_000);
        assert!(store.mark_processed(key.clone()));
        assert!(!store.mark_processed(key.clone()));
        assert!(store.is_processed(&key));
    }

    #[test]
    fn missing_files_start_empty_and_corrupt_orders_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            StateStore::load(dir.path().join("orders.json"), dir.path().join("signals.txt")).unwrap();
        assert!(store.is_empty());

        fs::write(dir.path().join("orders.json"), "{not json").unwrap();
        assert!(
            StateStore::load(dir.path().join("orders.json"), dir.path().join("signals.txt"))
                .is_err()
        );
    }

    #[test]
    fn malformed_signal_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("signals.txt"),
            "ETHUSDT|1h|1000\ngarbage\n\nSOLUSDT|2h|5\n",
        )
        .unwrap();
        let store =
            StateStore::load(dir.path().join("orders.json"), dir.path().join("signals.txt")).unwrap();
        assert_eq!(store.processed_count(), 1);
    }

    #[test]
    fn fill_claim_is_exclusive_and_releasable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.insert_order(order_record(5, "ETHUSDT", OrderRole::Entry, 100.5));
        store.insert_order(order_record(6, "ETHUSDT", OrderRole::StopLoss, 96.0));

        assert_eq!(store.claim_fill(5), Some(OrderStatus::New));
        assert_eq!(store.claim_fill(5), None);
        assert_eq!(store.claim_fill(6), None);
        assert_eq!(store.claim_fill(99), None);

        store.release_fill(5, OrderStatus::New);
        assert_eq!(store.get(5).map(|r| r.status), Some(OrderStatus::New));
        assert_eq!(store.claim_fill(5), Some(OrderStatus::New));
    }

    #[test]
    fn status_and_price_updates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.insert_order(order_record(6, "ETHUSDT", OrderRole::StopLoss, 96.0));
        assert_eq!(store.update_status(6, OrderStatus::Canceled), Some(OrderStatus::New));
        assert!(store.update_price(6, 95.5));
        assert!((store.get(6).unwrap().price - 95.5).abs() < 1e-12);
        assert!(store.remove_order(6).is_some());
        assert_eq!(store.update_status(6, OrderStatus::New), None);
        assert!(!store.update_price(6, 1.0));
    }
}
