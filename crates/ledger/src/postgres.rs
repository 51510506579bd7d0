use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    HistoryId, OrderId, ProductId, StockEventType, StockHistory, StockId, StockLine, VariantId,
    Version,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    LedgerError, Result,
    store::{ChangeSet, StockLedger},
};

const HISTORY_UNIQUE_CONSTRAINT: &str = "uk_history_order_stock";
const VARIANT_UNIQUE_CONSTRAINT: &str = "uk_stocks_variant";

/// PostgreSQL-backed ledger implementation.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_line(row: PgRow) -> Result<StockLine> {
        let quantity: i64 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| LedgerError::CorruptRow(format!("quantity out of range: {quantity}")))?;

        Ok(StockLine::restore(
            StockId::from_uuid(row.try_get::<Uuid, _>("id")?),
            ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            quantity,
            Version::new(row.try_get("version")?),
        ))
    }

    fn row_to_record(row: PgRow) -> Result<StockHistory> {
        let event_type: String = row.try_get("event_type")?;

        Ok(StockHistory::restore(
            HistoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            StockId::from_uuid(row.try_get::<Uuid, _>("stock_id")?),
            row.try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            event_type.parse::<StockEventType>()?,
            row.try_get("changed_quantity")?,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
        ))
    }

    async fn insert_record(
        tx: &mut Transaction<'_, Postgres>,
        record: &StockHistory,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_history (id, stock_id, order_id, product_id, variant_id, event_type, changed_quantity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id().as_uuid())
        .bind(record.stock_id().as_uuid())
        .bind(record.order_id().map(|id| id.as_uuid()))
        .bind(record.product_id().as_uuid())
        .bind(record.variant_id().as_uuid())
        .bind(record.event_type().as_str())
        .bind(record.changed_quantity())
        .bind(record.created_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            // A unique violation here means another worker already recorded this line
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(HISTORY_UNIQUE_CONSTRAINT)
                && let Some(order_id) = record.order_id()
            {
                return LedgerError::DuplicateOrderLine {
                    order_id,
                    stock_id: record.stock_id(),
                };
            }
            LedgerError::Database(e)
        })?;

        Ok(())
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn insert_line(&self, line: StockLine, record: StockHistory) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stocks (id, product_id, variant_id, quantity, version)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(line.id().as_uuid())
        .bind(line.product_id().as_uuid())
        .bind(line.variant_id().as_uuid())
        .bind(i64::from(line.quantity()))
        .bind(line.version().as_i64())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(VARIANT_UNIQUE_CONSTRAINT)
            {
                return LedgerError::AlreadyRegistered(line.variant_id());
            }
            LedgerError::Database(e)
        })?;

        Self::insert_record(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_variant(&self, variant_id: VariantId) -> Result<Option<StockLine>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, variant_id, quantity, version
            FROM stocks
            WHERE variant_id = $1
            "#,
        )
        .bind(variant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_line).transpose()
    }

    async fn find_by_id(&self, stock_id: StockId) -> Result<Option<StockLine>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, variant_id, quantity, version
            FROM stocks
            WHERE id = $1
            "#,
        )
        .bind(stock_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_line).transpose()
    }

    async fn has_record_for_order(&self, order_id: OrderId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM stock_history
                WHERE order_id = $1 AND event_type = $2
            )
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(StockEventType::Outbound.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn records_for_order(&self, order_id: OrderId) -> Result<Vec<StockHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, stock_id, order_id, product_id, variant_id, event_type, changed_quantity, created_at
            FROM stock_history
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn records_for_stock(&self, stock_id: StockId) -> Result<Vec<StockHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, stock_id, order_id, product_id, variant_id, event_type, changed_quantity, created_at
            FROM stock_history
            WHERE stock_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(stock_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        changes.validate()?;

        // Dropping the transaction without commit rolls everything back
        let mut tx = self.pool.begin().await?;

        for write in changes.writes() {
            let stock_id = write.line.id();
            let updated = sqlx::query(
                r#"
                UPDATE stocks
                SET quantity = $1, version = $2, updated_at = NOW()
                WHERE id = $3 AND version = $4
                "#,
            )
            .bind(i64::from(write.line.quantity()))
            .bind(write.line.version().as_i64())
            .bind(stock_id.as_uuid())
            .bind(write.expected_version.as_i64())
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM stocks WHERE id = $1")
                        .bind(stock_id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;

                let Some(actual) = actual else {
                    return Err(LedgerError::UnknownStockLine(stock_id));
                };

                metrics::counter!("ledger_concurrency_conflicts_total").increment(1);
                tracing::debug!(
                    %stock_id,
                    expected = %write.expected_version,
                    actual,
                    "stale stock line write"
                );
                return Err(LedgerError::ConcurrencyConflict {
                    stock_id,
                    expected: write.expected_version,
                    actual: Version::new(actual),
                });
            }
        }

        for record in changes.records() {
            Self::insert_record(&mut tx, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
