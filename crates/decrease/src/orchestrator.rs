//! Decrease orchestrator: applies one order's decrement batch.

use common::{OrderId, VariantId};
use ledger::{ChangeSet, LedgerError, StockHistory, StockLedger, StockLedgerExt};

use crate::error::DecreaseFailure;
use crate::events::{DecreaseLine, StockDecreaseSuccessEvent};
use crate::publisher::StockEventPublisher;

/// How a successful `decrease_batch` call came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecreaseOutcome {
    /// Every line was decremented by this call.
    Applied,
    /// The order had already been applied; nothing changed.
    AlreadyApplied,
}

/// Applies decrement batches against the ledger.
///
/// All coordination with other workers goes through the ledger: stale line
/// versions surface as `Conflict`, and a second attempt at an order that
/// already committed is caught by the per-(order, line) record constraint.
pub struct DecreaseOrchestrator<L, P>
where
    L: StockLedger,
    P: StockEventPublisher,
{
    ledger: L,
    publisher: P,
}

impl<L, P> DecreaseOrchestrator<L, P>
where
    L: StockLedger,
    P: StockEventPublisher,
{
    /// Creates a new orchestrator.
    pub fn new(ledger: L, publisher: P) -> Self {
        Self { ledger, publisher }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Decrements every line of an order, or none of them.
    ///
    /// Lines are processed in the order given. Repeated options are merged
    /// into a single decrement of the summed amount.
    #[tracing::instrument(skip(self, items), fields(order_id = %order_id, lines = items.len()))]
    pub async fn decrease_batch(
        &self,
        order_id: OrderId,
        items: &[DecreaseLine],
    ) -> Result<DecreaseOutcome, DecreaseFailure> {
        let started = std::time::Instant::now();

        if self.ledger.has_record_for_order(order_id).await? {
            tracing::info!("order already applied, skipping");
            return Ok(DecreaseOutcome::AlreadyApplied);
        }

        let lines = coalesce(items)?;

        let mut changes = ChangeSet::new();
        for (variant_id, amount) in lines {
            let mut line = self.ledger.get_by_variant(variant_id).await?;
            let expected_version = line.version();

            line.decrease(amount)?;
            tracing::debug!(
                stock_id = %line.id(),
                variant_id = %variant_id,
                amount,
                remaining = line.quantity(),
                "line decremented"
            );

            changes
                .record(StockHistory::outbound(&line, order_id, amount)?)
                .write_line(line, expected_version);
        }

        match self.ledger.commit(changes).await {
            Ok(()) => {}
            Err(LedgerError::DuplicateOrderLine { stock_id, .. }) => {
                tracing::info!(%stock_id, "order committed by another worker");
                return Ok(DecreaseOutcome::AlreadyApplied);
            }
            Err(e) => return Err(e.into()),
        }

        metrics::histogram!("stock_decrease_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        // Committed: a failed notification no longer fails the decrement
        if let Err(e) = self
            .publisher
            .publish_success(StockDecreaseSuccessEvent::new(order_id))
            .await
        {
            tracing::error!(error = %e, "failed to publish decrease success event");
        }

        Ok(DecreaseOutcome::Applied)
    }
}

/// Merges repeated options, keeping first-appearance order.
fn coalesce(items: &[DecreaseLine]) -> Result<Vec<(VariantId, u32)>, DecreaseFailure> {
    if items.is_empty() {
        return Err(DecreaseFailure::InvalidBatch(
            "Batch has no lines".to_string(),
        ));
    }

    let mut lines: Vec<(VariantId, u32)> = Vec::with_capacity(items.len());
    for item in items {
        if item.amount == 0 {
            return Err(DecreaseFailure::InvalidBatch(format!(
                "Amount for option {} must be positive",
                item.line_ref
            )));
        }

        match lines.iter_mut().find(|(variant_id, _)| *variant_id == item.line_ref) {
            Some((_, amount)) => {
                *amount = amount.checked_add(item.amount).ok_or_else(|| {
                    DecreaseFailure::InvalidBatch(format!(
                        "Amount for option {} overflows",
                        item.line_ref
                    ))
                })?;
            }
            None => lines.push((item.line_ref, item.amount)),
        }
    }

    Ok(lines)
}
