//! Stock line: the versioned inventory counter.

use common::{ProductId, StockId, VariantId};
use serde::{Deserialize, Serialize};

use crate::error::StockError;

/// Version number of a stock line, used for optimistic concurrency control.
///
/// A freshly registered line is at version 0; every mutation bumps it by 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a freshly registered line.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One inventory counter per (product, option) pair.
///
/// The quantity can never go negative. Mutations only happen in memory;
/// persisting them is the ledger's job, which rejects the write if the
/// stored version moved on in the meantime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    id: StockId,
    product_id: ProductId,
    variant_id: VariantId,
    quantity: u32,
    version: Version,
}

impl StockLine {
    /// Registers a new stock line with its initial quantity.
    pub fn register(
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<Self, StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidInitialQuantity(quantity));
        }

        Ok(Self {
            id: StockId::new(),
            product_id,
            variant_id,
            quantity,
            version: Version::initial(),
        })
    }

    /// Rebuilds a line from its stored representation.
    pub fn restore(
        id: StockId,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
        version: Version,
    ) -> Self {
        Self {
            id,
            product_id,
            variant_id,
            quantity,
            version,
        }
    }

    pub fn id(&self) -> StockId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Removes `amount` units from the line.
    ///
    /// Fails without touching the line if `amount` is zero or exceeds the
    /// current quantity.
    pub fn decrease(&mut self, amount: u32) -> Result<(), StockError> {
        if amount == 0 {
            return Err(StockError::InvalidAmount(amount));
        }
        if self.quantity < amount {
            return Err(StockError::InsufficientStock {
                stock_id: self.id,
                variant_id: self.variant_id,
                available: self.quantity,
                requested: amount,
            });
        }

        self.quantity -= amount;
        self.version = self.version.next();
        Ok(())
    }

    /// Adds `amount` units to the line.
    pub fn increase(&mut self, amount: u32) -> Result<(), StockError> {
        if amount == 0 {
            return Err(StockError::InvalidAmount(amount));
        }

        self.quantity = self
            .quantity
            .checked_add(amount)
            .ok_or(StockError::QuantityOverflow(self.id))?;
        self.version = self.version.next();
        Ok(())
    }
}
