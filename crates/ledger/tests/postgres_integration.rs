//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use ledger::{
    ChangeSet, LedgerError, OrderId, PostgresStockLedger, ProductId, StockEventType,
    StockHistory, StockLedger, StockLedgerExt, VariantId, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_stock_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh ledger with its own pool and cleared tables
async fn get_test_ledger() -> PostgresStockLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE stock_history, stocks")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStockLedger::new(pool)
}

#[tokio::test]
#[serial]
async fn register_and_load_stock_line() {
    let ledger = get_test_ledger().await;
    let variant_id = VariantId::new();

    let line = ledger
        .register_stock(ProductId::new(), variant_id, 10)
        .await
        .unwrap();

    let stored = ledger.get_by_variant(variant_id).await.unwrap();
    assert_eq!(stored, line);
    assert_eq!(ledger.find_by_id(line.id()).await.unwrap(), Some(line.clone()));

    let records = ledger.records_for_stock(line.id()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_type(), StockEventType::Inbound);
    assert_eq!(records[0].order_id(), None);
}

#[tokio::test]
#[serial]
async fn duplicate_registration_is_rejected() {
    let ledger = get_test_ledger().await;
    let variant_id = VariantId::new();

    ledger
        .register_stock(ProductId::new(), variant_id, 10)
        .await
        .unwrap();
    let result = ledger.register_stock(ProductId::new(), variant_id, 3).await;
    assert!(matches!(result, Err(LedgerError::AlreadyRegistered(_))));
}

#[tokio::test]
#[serial]
async fn versioned_write_commits_with_record() {
    let ledger = get_test_ledger().await;
    let mut line = ledger
        .register_stock(ProductId::new(), VariantId::new(), 10)
        .await
        .unwrap();
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

    let records = ledger.records_for_order(order_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].changed_quantity(), -4);
}

#[tokio::test]
#[serial]
async fn stale_version_is_a_conflict() {
    let ledger = get_test_ledger().await;
    let line = ledger
        .register_stock(ProductId::new(), VariantId::new(), 10)
        .await
        .unwrap();

    let mut first = line.clone();
    first.decrease(1).unwrap();
    let mut changes = ChangeSet::new();
    changes.write_line(first, line.version());
    ledger.commit(changes).await.unwrap();

    let mut second = line.clone();
    second.decrease(2).unwrap();
    let mut changes = ChangeSet::new();
    changes.write_line(second, line.version());
    let result = ledger.commit(changes).await;

    match result {
        Err(LedgerError::ConcurrencyConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, Version::initial());
            assert_eq!(actual, Version::new(1));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn failed_commit_rolls_back_every_write() {
    let ledger = get_test_ledger().await;
    let fresh = ledger
        .register_stock(ProductId::new(), VariantId::new(), 10)
        .await
        .unwrap();
    let stale = ledger
        .register_stock(ProductId::new(), VariantId::new(), 10)
        .await
        .unwrap();

    // Move the second line on so the batch write below is stale
    ledger
        .restock(stale.variant_id(), 1, StockEventType::Return, None)
        .await
        .unwrap();

    let order_id = OrderId::new();
    let mut changes = ChangeSet::new();
    for line in [&fresh, &stale] {
        let mut updated = line.clone();
        updated.decrease(2).unwrap();
        changes
            .record(StockHistory::outbound(&updated, order_id, 2).unwrap())
            .write_line(updated, line.version());
    }

    let result = ledger.commit(changes).await;
    assert!(result.unwrap_err().is_conflict());

    let fresh_now = ledger.get_by_variant(fresh.variant_id()).await.unwrap();
    assert_eq!(fresh_now.quantity(), 10);
    assert!(!ledger.has_record_for_order(order_id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn duplicate_order_line_maps_unique_violation() {
    let ledger = get_test_ledger().await;
    let line = ledger
        .register_stock(ProductId::new(), VariantId::new(), 10)
        .await
        .unwrap();
    let order_id = OrderId::new();

    ledger.record_decrement(&line, order_id, 2).await.unwrap();
    let result = ledger.record_decrement(&line, order_id, 2).await;
    assert!(matches!(
        result,
        Err(LedgerError::DuplicateOrderLine { .. })
    ));
}

#[tokio::test]
#[serial]
async fn cancel_after_decrement_of_same_order() {
    let ledger = get_test_ledger().await;
    let mut line = ledger
        .register_stock(ProductId::new(), VariantId::new(), 10)
        .await
        .unwrap();
    let order_id = OrderId::new();

    let expected = line.version();
    line.decrease(3).unwrap();
    let mut changes = ChangeSet::new();
    changes
        .record(StockHistory::outbound(&line, order_id, 3).unwrap())
        .write_line(line.clone(), expected);
    ledger.commit(changes).await.unwrap();

    let restocked = ledger
        .restock(line.variant_id(), 3, StockEventType::Cancel, Some(order_id))
        .await
        .unwrap();
    assert_eq!(restocked.quantity(), 10);
    assert_eq!(restocked.version(), Version::new(2));

    let records = ledger.records_for_order(order_id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(ledger.has_record_for_order(order_id).await.unwrap());

    // The partial index still refuses a second decrement
    let result = ledger.record_decrement(&restocked, order_id, 1).await;
    assert!(matches!(
        result,
        Err(LedgerError::DuplicateOrderLine { .. })
    ));
}

#[tokio::test]
#[serial]
async fn restock_alone_does_not_mark_order_applied() {
    let ledger = get_test_ledger().await;
    let line = ledger
        .register_stock(ProductId::new(), VariantId::new(), 2)
        .await
        .unwrap();
    let order_id = OrderId::new();

    ledger
        .restock(line.variant_id(), 1, StockEventType::Return, Some(order_id))
        .await
        .unwrap();
    assert!(!ledger.has_record_for_order(order_id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn concurrent_writers_on_same_version_only_one_wins() {
    let ledger = get_test_ledger().await;
    let line = ledger
        .register_stock(ProductId::new(), VariantId::new(), 10)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let ledger = ledger.clone();
        let mut updated = line.clone();
        let expected = line.version();
        handles.push(tokio::spawn(async move {
            updated.decrease(1).unwrap();
            let mut changes = ChangeSet::new();
            changes
                .record(StockHistory::outbound(&updated, OrderId::new(), 1).unwrap())
                .write_line(updated, expected);
            ledger.commit(changes).await
        }));
    }

    let results = futures_util::future::join_all(handles).await;
    let succeeded = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(succeeded, 1);

    let stored = ledger.get_by_variant(line.variant_id()).await.unwrap();
    assert_eq!(stored.quantity(), 9);
    assert_eq!(stored.version(), Version::new(1));
}
