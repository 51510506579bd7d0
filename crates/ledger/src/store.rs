use std::collections::HashSet;

use async_trait::async_trait;
use domain::{
    OrderId, ProductId, StockEventType, StockHistory, StockId, StockLine, VariantId, Version,
};

use crate::{LedgerError, Result};

/// A stock line write guarded by the version it was read at.
#[derive(Debug, Clone)]
pub struct LineWrite {
    /// The mutated line, carrying its new quantity and version.
    pub line: StockLine,
    /// The version the line had when it was loaded.
    pub expected_version: Version,
}

/// A set of line writes and history records committed atomically.
///
/// Either every write and every record is persisted, or none is.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    writes: Vec<LineWrite>,
    records: Vec<StockHistory>,
}

impl ChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a versioned write of a mutated line.
    pub fn write_line(&mut self, line: StockLine, expected_version: Version) -> &mut Self {
        self.writes.push(LineWrite {
            line,
            expected_version,
        });
        self
    }

    /// Adds a history record.
    pub fn record(&mut self, record: StockHistory) -> &mut Self {
        self.records.push(record);
        self
    }

    pub fn writes(&self) -> &[LineWrite] {
        &self.writes
    }

    pub fn records(&self) -> &[StockHistory] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.records.is_empty()
    }

    /// Checks the change set is consistent before it reaches storage.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(LedgerError::InvalidChangeSet(
                "Cannot commit an empty change set".to_string(),
            ));
        }

        let mut written = HashSet::new();
        for write in &self.writes {
            if !written.insert(write.line.id()) {
                return Err(LedgerError::InvalidChangeSet(format!(
                    "Stock line {} is written more than once",
                    write.line.id()
                )));
            }
            if write.line.version() <= write.expected_version {
                return Err(LedgerError::InvalidChangeSet(format!(
                    "Stock line {} must move past version {}",
                    write.line.id(),
                    write.expected_version
                )));
            }
        }

        let mut keys = HashSet::new();
        for record in self.records.iter().filter(|r| r.event_type().is_outbound()) {
            if let Some(order_id) = record.order_id()
                && !keys.insert((order_id, record.stock_id()))
            {
                return Err(LedgerError::DuplicateOrderLine {
                    order_id,
                    stock_id: record.stock_id(),
                });
            }
        }

        Ok(())
    }
}

/// Core trait for ledger storage implementations.
///
/// Implementations enforce both coordination rules themselves, so callers
/// never need in-process locks:
/// - `commit` fails with `ConcurrencyConflict` if any written line is no
///   longer at its expected version
/// - `commit` fails with `DuplicateOrderLine` if an outbound record for the
///   same (order, stock line) already exists
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Stores a freshly registered line together with its stock-in record.
    async fn insert_line(&self, line: StockLine, record: StockHistory) -> Result<()>;

    /// Finds the stock line for a product option.
    async fn find_by_variant(&self, variant_id: VariantId) -> Result<Option<StockLine>>;

    /// Finds a stock line by its id.
    async fn find_by_id(&self, stock_id: StockId) -> Result<Option<StockLine>>;

    /// Returns true if an outbound record references the order.
    ///
    /// Cancel and return records carrying the order do not count.
    async fn has_record_for_order(&self, order_id: OrderId) -> Result<bool>;

    /// Retrieves the history records of an order, oldest first.
    async fn records_for_order(&self, order_id: OrderId) -> Result<Vec<StockHistory>>;

    /// Retrieves the history records of a stock line, oldest first.
    async fn records_for_stock(&self, stock_id: StockId) -> Result<Vec<StockHistory>>;

    /// Atomically applies the writes and appends the records.
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}

/// Extension trait providing the ledger operations built on `StockLedger`.
#[async_trait]
pub trait StockLedgerExt: StockLedger {
    /// Registers a new line and records its initial stock-in.
    async fn register_stock(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<StockLine> {
        let line = StockLine::register(product_id, variant_id, quantity)?;
        let record = StockHistory::inbound(&line)?;
        self.insert_line(line.clone(), record).await?;
        Ok(line)
    }

    /// Loads the line for an option, failing if none is registered.
    async fn get_by_variant(&self, variant_id: VariantId) -> Result<StockLine> {
        self.find_by_variant(variant_id)
            .await?
            .ok_or(LedgerError::StockNotFound(variant_id))
    }

    /// Appends the outbound record of an order's decrement on a line.
    ///
    /// Fails with `DuplicateOrderLine` if the order already has a record
    /// for this line.
    async fn record_decrement(
        &self,
        line: &StockLine,
        order_id: OrderId,
        amount: u32,
    ) -> Result<()> {
        let mut changes = ChangeSet::new();
        changes.record(StockHistory::outbound(line, order_id, amount)?);
        self.commit(changes).await
    }

    /// Puts units back on a line and records why.
    ///
    /// A cancel or return may reference the order whose decrement it undoes.
    async fn restock(
        &self,
        variant_id: VariantId,
        amount: u32,
        event_type: StockEventType,
        order_id: Option<OrderId>,
    ) -> Result<StockLine> {
        let mut line = self.get_by_variant(variant_id).await?;
        let expected_version = line.version();
        line.increase(amount)?;

        let mut changes = ChangeSet::new();
        changes
            .record(StockHistory::restock(&line, order_id, event_type, amount)?)
            .write_line(line.clone(), expected_version);
        self.commit(changes).await?;

        Ok(line)
    }
}

// Blanket implementation for all StockLedger implementations
impl<T: StockLedger + ?Sized> StockLedgerExt for T {}
