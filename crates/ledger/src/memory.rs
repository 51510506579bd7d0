use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{OrderId, StockHistory, StockId, StockLine, VariantId};
use tokio::sync::RwLock;

use crate::{
    LedgerError, Result,
    store::{ChangeSet, StockLedger},
};

#[derive(Debug, Default)]
struct LedgerState {
    lines: HashMap<StockId, StockLine>,
    by_variant: HashMap<VariantId, StockId>,
    history: Vec<StockHistory>,
    fail_commits_with_conflict: bool,
}

/// In-memory ledger implementation for testing.
///
/// A single write lock around each commit gives the same all-or-nothing
/// behaviour as the PostgreSQL transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent commit fail with a concurrency conflict.
    pub async fn set_fail_commits_with_conflict(&self, fail: bool) {
        self.state.write().await.fail_commits_with_conflict = fail;
    }

    /// Returns the total number of history records stored.
    pub async fn history_count(&self) -> usize {
        self.state.read().await.history.len()
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn insert_line(&self, line: StockLine, record: StockHistory) -> Result<()> {
        let mut state = self.state.write().await;

        if state.by_variant.contains_key(&line.variant_id()) {
            return Err(LedgerError::AlreadyRegistered(line.variant_id()));
        }

        state.by_variant.insert(line.variant_id(), line.id());
        state.lines.insert(line.id(), line);
        state.history.push(record);
        Ok(())
    }

    async fn find_by_variant(&self, variant_id: VariantId) -> Result<Option<StockLine>> {
        let state = self.state.read().await;
        Ok(state
            .by_variant
            .get(&variant_id)
            .and_then(|id| state.lines.get(id))
            .cloned())
    }

    async fn find_by_id(&self, stock_id: StockId) -> Result<Option<StockLine>> {
        Ok(self.state.read().await.lines.get(&stock_id).cloned())
    }

    async fn has_record_for_order(&self, order_id: OrderId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .any(|record| {
                record.event_type().is_outbound() && record.order_id() == Some(order_id)
            }))
    }

    async fn records_for_order(&self, order_id: OrderId) -> Result<Vec<StockHistory>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|record| record.order_id() == Some(order_id))
            .cloned()
            .collect())
    }

    async fn records_for_stock(&self, stock_id: StockId) -> Result<Vec<StockHistory>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|record| record.stock_id() == stock_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        changes.validate()?;

        let mut state = self.state.write().await;

        // Check every guard before applying anything
        for write in changes.writes() {
            let current = state
                .lines
                .get(&write.line.id())
                .ok_or(LedgerError::UnknownStockLine(write.line.id()))?;

            if state.fail_commits_with_conflict || current.version() != write.expected_version {
                metrics::counter!("ledger_concurrency_conflicts_total").increment(1);
                return Err(LedgerError::ConcurrencyConflict {
                    stock_id: write.line.id(),
                    expected: write.expected_version,
                    actual: current.version(),
                });
            }
        }

        // Partial unique (order, stock line) index simulation, outbound only
        for record in changes.records().iter().filter(|r| r.event_type().is_outbound()) {
            if let Some(order_id) = record.order_id()
                && state.history.iter().any(|existing| {
                    existing.event_type().is_outbound()
                        && existing.order_id() == Some(order_id)
                        && existing.stock_id() == record.stock_id()
                })
            {
                return Err(LedgerError::DuplicateOrderLine {
                    order_id,
                    stock_id: record.stock_id(),
                });
            }
        }

        for write in changes.writes() {
            state.lines.insert(write.line.id(), write.line.clone());
        }
        state.history.extend(changes.records().iter().cloned());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain::{ProductId, StockEventType, Version};

    use super::*;
    use crate::store::StockLedgerExt;

    async fn ledger_with_line(quantity: u32) -> (InMemoryStockLedger, StockLine) {
        let ledger = InMemoryStockLedger::new();
        let line = ledger
            .register_stock(ProductId::new(), VariantId::new(), quantity)
            .await
            .unwrap();
        (ledger, line)
    }

    #[tokio::test]
    async fn register_stock_writes_inbound_record() {
        let (ledger, line) = ledger_with_line(10).await;

        let stored = ledger.get_by_variant(line.variant_id()).await.unwrap();
        assert_eq!(stored, line);

        let records = ledger.records_for_stock(line.id()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type(), StockEventType::Inbound);
        assert_eq!(records[0].changed_quantity(), 10);
    }

    #[tokio::test]
    async fn register_twice_for_same_option_is_rejected() {
        let (ledger, line) = ledger_with_line(10).await;
        let result = ledger
            .register_stock(line.product_id(), line.variant_id(), 5)
            .await;
        assert!(matches!(result, Err(LedgerError::AlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn unknown_variant_is_not_found() {
        let ledger = InMemoryStockLedger::new();
        let result = ledger.get_by_variant(VariantId::new()).await;
        assert!(matches!(result, Err(LedgerError::StockNotFound(_))));
    }

    #[tokio::test]
    async fn commit_applies_write_and_record() {
        let (ledger, mut line) = ledger_with_line(10).await;
        let order_id = OrderId::new();
        let expected = line.version();
        line.decrease(4).unwrap();

        let mut changes = ChangeSet::new();
        changes
            .write_line(line.clone(), expected)
            .record(StockHistory::outbound(&line, order_id, 4).unwrap());
        ledger.commit(changes).await.unwrap();

        let stored = ledger.get_by_variant(line.variant_id()).await.unwrap();
        assert_eq!(stored.quantity(), 6);
        assert_eq!(stored.version(), Version::new(1));
        assert!(ledger.has_record_for_order(order_id).await.unwrap());
    }

    #[tokio::test]
    async fn stale_write_is_a_conflict_and_changes_nothing() {
        let (ledger, line) = ledger_with_line(10).await;

        // Two workers read the same version
        let mut first = line.clone();
        let mut second = line.clone();
        first.decrease(3).unwrap();
        second.decrease(2).unwrap();

        let mut changes = ChangeSet::new();
        changes.write_line(first, line.version());
        ledger.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes
            .write_line(second.clone(), line.version())
            .record(StockHistory::outbound(&second, OrderId::new(), 2).unwrap());
        let result = ledger.commit(changes).await;
        assert!(matches!(
            result,
            Err(LedgerError::ConcurrencyConflict { .. })
        ));

        let stored = ledger.get_by_variant(line.variant_id()).await.unwrap();
        assert_eq!(stored.quantity(), 7);
        assert_eq!(ledger.history_count().await, 1);
    }

    #[tokio::test]
    async fn record_decrement_twice_is_duplicate() {
        let (ledger, line) = ledger_with_line(10).await;
        let order_id = OrderId::new();

        ledger.record_decrement(&line, order_id, 2).await.unwrap();
        let result = ledger.record_decrement(&line, order_id, 2).await;
        assert!(matches!(
            result,
            Err(LedgerError::DuplicateOrderLine { .. })
        ));
        assert_eq!(ledger.records_for_order(order_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn restock_increases_and_records() {
        let (ledger, line) = ledger_with_line(3).await;
        let order_id = OrderId::new();

        let restocked = ledger
            .restock(line.variant_id(), 2, StockEventType::Cancel, Some(order_id))
            .await
            .unwrap();
        assert_eq!(restocked.quantity(), 5);
        assert_eq!(restocked.version(), Version::new(1));

        let records = ledger.records_for_order(order_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].changed_quantity(), 2);
    }

    #[tokio::test]
    async fn cancel_after_decrement_of_same_order() {
        let (ledger, mut line) = ledger_with_line(10).await;
        let order_id = OrderId::new();
        let expected = line.version();
        line.decrease(3).unwrap();

        let mut changes = ChangeSet::new();
        changes
            .write_line(line.clone(), expected)
            .record(StockHistory::outbound(&line, order_id, 3).unwrap());
        ledger.commit(changes).await.unwrap();

        let restocked = ledger
            .restock(line.variant_id(), 3, StockEventType::Cancel, Some(order_id))
            .await
            .unwrap();
        assert_eq!(restocked.quantity(), 10);
        assert_eq!(restocked.version(), Version::new(2));
        assert_eq!(ledger.records_for_order(order_id).await.unwrap().len(), 2);

        // The decrement still gates redelivery, a second decrement is still refused
        assert!(ledger.has_record_for_order(order_id).await.unwrap());
        let result = ledger.record_decrement(&restocked, order_id, 1).await;
        assert!(matches!(
            result,
            Err(LedgerError::DuplicateOrderLine { .. })
        ));
    }

    #[tokio::test]
    async fn restock_alone_does_not_mark_order_applied() {
        let (ledger, line) = ledger_with_line(3).await;
        let order_id = OrderId::new();

        ledger
            .restock(line.variant_id(), 1, StockEventType::Return, Some(order_id))
            .await
            .unwrap();
        assert!(!ledger.has_record_for_order(order_id).await.unwrap());
    }

    #[tokio::test]
    async fn forced_conflict_mode() {
        let (ledger, mut line) = ledger_with_line(10).await;
        ledger.set_fail_commits_with_conflict(true).await;

        let expected = line.version();
        line.decrease(1).unwrap();
        let mut changes = ChangeSet::new();
        changes.write_line(line, expected);

        let result = ledger.commit(changes).await;
        assert!(result.unwrap_err().is_conflict());
    }
}
