#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;
use chrono::Duration;

use billing_ledger::{
    LedgerError,
    clock::FixedClock,
    config::{LedgerConfig, OverpaymentPolicy},
    ledger::{
        Ledger, audit_log_for_entity, create_transaction, get_transaction,
        list_payments_for_client, list_payments_for_transaction, record_payment,
    },
    models::{AUDIT_LOG, PAYMENTS, TRANSACTIONS, Transaction, TransactionStatus, TransactionType},
    store::{
        BatchOp, DocumentStore, Filter, MemoryStore, Sort, StoreError, StoreResult, UniqueIndex,
    },
};

use common::{at, one_time, payment, seed_client, setup_ledger, setup_with};

#[tokio::test]
async fn partial_then_full_payment_collects() {
    let ctx = setup_ledger().await;
    let client = seed_client(&ctx, "Ana").await;
    let tx = create_transaction(&ctx.ledger, one_time(&client, 100.0, None))
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::ToCollect);
    assert_eq!(tx.pending_amount, 100.0);

    record_payment(&ctx.ledger, payment(&tx.id, 40.0))
        .await
        .unwrap();
    let after_first = get_transaction(&ctx.ledger, &tx.id).await.unwrap().unwrap();
    assert_eq!(after_first.amount_paid, 40.0);
    assert_eq!(after_first.pending_amount, 60.0);
    assert_eq!(after_first.status, TransactionStatus::PartiallyPaid);

    record_payment(&ctx.ledger, payment(&tx.id, 60.0))
        .await
        .unwrap();
    let after_second = get_transaction(&ctx.ledger, &tx.id).await.unwrap().unwrap();
    assert_eq!(after_second.amount_paid, 100.0);
    assert_eq!(after_second.pending_amount, 0.0);
    assert_eq!(after_second.status, TransactionStatus::Collected);
    assert_eq!(after_second.version, 2);
}

#[tokio::test]
async fn payments_sum_to_amount_paid_and_each_leaves_an_audit_entry() {
    let ctx = setup_ledger().await;
    let client = seed_client(&ctx, "Bruno").await;
    let tx = create_transaction(&ctx.ledger, one_time(&client, 90.0, None))
        .await
        .unwrap();

    for amount in [10.0, 25.0, 30.0] {
        ctx.clock.advance(Duration::minutes(5));
        record_payment(&ctx.ledger, payment(&tx.id, amount))
            .await
            .unwrap();
    }

    let stored = get_transaction(&ctx.ledger, &tx.id).await.unwrap().unwrap();
    let payments = list_payments_for_transaction(&ctx.ledger, &tx.id)
        .await
        .unwrap();
    let sum: f64 = payments.iter().map(|p| p.amount).sum();
    assert_eq!(payments.len(), 3);
    assert_eq!(sum, stored.amount_paid);
    assert_eq!(stored.pending_amount, stored.total_amount - stored.amount_paid);
    assert!(payments.iter().all(|p| p.client_id == client));

    let by_client = list_payments_for_client(&ctx.ledger, &client).await.unwrap();
    assert_eq!(by_client.len(), 3);

    let trail = audit_log_for_entity(&ctx.ledger, &tx.id).await.unwrap();
    let recorded: Vec<_> = trail
        .iter()
        .filter(|e| e.action == "payment_recorded")
        .collect();
    assert_eq!(recorded.len(), 3);
    // newest first
    let newest = recorded[0].new_value.as_ref().unwrap();
    assert_eq!(newest["amount_paid"].as_f64(), Some(65.0));
    assert_eq!(newest["payment_amount"].as_f64(), Some(30.0));
    assert_eq!(recorded[0].performed_by, "cajero@example.com");
    assert!(trail.iter().any(|e| e.action == "transaction_created"));
}

#[tokio::test]
async fn overpayment_is_rejected_by_default() {
    let ctx = setup_ledger().await;
    let client = seed_client(&ctx, "Carla").await;
    let tx = create_transaction(&ctx.ledger, one_time(&client, 50.0, None))
        .await
        .unwrap();

    let err = record_payment(&ctx.ledger, payment(&tx.id, 50.01))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));

    let stored = get_transaction(&ctx.ledger, &tx.id).await.unwrap().unwrap();
    assert_eq!(stored.amount_paid, 0.0);
    assert_eq!(ctx.store.count(PAYMENTS).await, 0);
}

#[tokio::test]
async fn cent_payments_settle_exactly() {
    let ctx = setup_ledger().await;
    let client = seed_client(&ctx, "Cecilia").await;

    let cafe = create_transaction(&ctx.ledger, one_time(&client, 0.9, None))
        .await
        .unwrap();
    for amount in [0.7, 0.2] {
        record_payment(&ctx.ledger, payment(&cafe.id, amount))
            .await
            .unwrap();
    }
    let stored = get_transaction(&ctx.ledger, &cafe.id).await.unwrap().unwrap();
    assert_eq!(stored.amount_paid, 0.9);
    assert_eq!(stored.pending_amount, 0.0);
    assert_eq!(stored.status, TransactionStatus::Collected);

    let snack = create_transaction(&ctx.ledger, one_time(&client, 0.3, None))
        .await
        .unwrap();
    for amount in [0.1, 0.2] {
        record_payment(&ctx.ledger, payment(&snack.id, amount))
            .await
            .unwrap();
    }
    let stored = get_transaction(&ctx.ledger, &snack.id).await.unwrap().unwrap();
    assert_eq!(stored.amount_paid, 0.3);
    assert_eq!(stored.pending_amount, 0.0);
    assert_eq!(stored.status, TransactionStatus::Collected);

    // One more cent is a real overpayment.
    let err = record_payment(&ctx.ledger, payment(&snack.id, 0.01))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn overpayment_is_accepted_when_allowed() {
    let config = LedgerConfig {
        overpayment: OverpaymentPolicy::Allow,
        ..LedgerConfig::default()
    };
    let ctx = setup_with(config, at(2024, 3, 1, 9)).await;
    let client = seed_client(&ctx, "Dario").await;
    let tx = create_transaction(&ctx.ledger, one_time(&client, 50.0, None))
        .await
        .unwrap();

    record_payment(&ctx.ledger, payment(&tx.id, 70.0))
        .await
        .unwrap();
    let stored = get_transaction(&ctx.ledger, &tx.id).await.unwrap().unwrap();
    assert_eq!(stored.amount_paid, 70.0);
    assert_eq!(stored.pending_amount, -20.0);
    assert_eq!(stored.status, TransactionStatus::Collected);
}

#[tokio::test]
async fn non_positive_amounts_are_invalid() {
    let ctx = setup_ledger().await;
    let client = seed_client(&ctx, "Elena").await;
    let tx = create_transaction(&ctx.ledger, one_time(&client, 50.0, None))
        .await
        .unwrap();

    for amount in [0.0, -5.0, 0.001, f64::NAN] {
        let err = record_payment(&ctx.ledger, payment(&tx.id, amount))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)), "{amount}");
    }
    assert_eq!(ctx.store.count(PAYMENTS).await, 0);
}

#[tokio::test]
async fn unknown_transaction_is_not_found() {
    let ctx = setup_ledger().await;
    let err = record_payment(&ctx.ledger, payment("missing", 10.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::NotFound {
            entity: "transaction",
            ..
        }
    ));
}

#[tokio::test]
async fn payment_for_another_client_is_invalid() {
    let ctx = setup_ledger().await;
    let owner = seed_client(&ctx, "Fabian").await;
    let other = seed_client(&ctx, "Gina").await;
    let tx = create_transaction(&ctx.ledger, one_time(&owner, 50.0, None))
        .await
        .unwrap();

    let mut input = payment(&tx.id, 10.0);
    input.client_id = Some(other);
    let err = record_payment(&ctx.ledger, input).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn failed_batch_leaves_no_partial_write() {
    let ctx = setup_ledger().await;
    let client = seed_client(&ctx, "Hugo").await;
    let tx = create_transaction(&ctx.ledger, one_time(&client, 80.0, None))
        .await
        .unwrap();
    let audit_before = ctx.store.count(AUDIT_LOG).await;

    ctx.store.fail_next_batch();
    let err = record_payment(&ctx.ledger, payment(&tx.id, 30.0))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Persistence(_)));

    let stored = get_transaction(&ctx.ledger, &tx.id).await.unwrap().unwrap();
    assert_eq!(stored.amount_paid, 0.0);
    assert_eq!(stored.status, TransactionStatus::ToCollect);
    assert_eq!(stored.version, 0);
    assert_eq!(ctx.store.count(PAYMENTS).await, 0);
    assert_eq!(ctx.store.count(AUDIT_LOG).await, audit_before);

    // The failure was one-shot; the same payment now goes through.
    record_payment(&ctx.ledger, payment(&tx.id, 30.0))
        .await
        .unwrap();
    assert_eq!(ctx.store.count(PAYMENTS).await, 1);
}

#[tokio::test]
async fn late_partial_payment_stays_partially_paid() {
    let ctx = setup_ledger().await;
    let client = seed_client(&ctx, "Ines").await;
    let due = ctx.ledger.now() - Duration::days(3);
    let tx = create_transaction(&ctx.ledger, one_time(&client, 100.0, Some(due)))
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Overdue);

    record_payment(&ctx.ledger, payment(&tx.id, 10.0))
        .await
        .unwrap();
    let stored = get_transaction(&ctx.ledger, &tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::PartiallyPaid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_are_all_counted() {
    let config = LedgerConfig {
        conflict_retries: 20,
        ..LedgerConfig::default()
    };
    let ctx = setup_with(config, at(2024, 3, 1, 9)).await;
    let client = seed_client(&ctx, "Julia").await;
    let tx = create_transaction(&ctx.ledger, one_time(&client, 100.0, None))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ledger = ctx.ledger.clone();
        let input = payment(&tx.id, 20.0);
        handles.push(tokio::spawn(async move {
            record_payment(&ledger, input).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = get_transaction(&ctx.ledger, &tx.id).await.unwrap().unwrap();
    assert_eq!(stored.amount_paid, 100.0);
    assert_eq!(stored.pending_amount, 0.0);
    assert_eq!(stored.status, TransactionStatus::Collected);
    assert_eq!(ctx.store.count(PAYMENTS).await, 5);
}

/// Store whose batches always lose the version race.
struct AlwaysStale(MemoryStore);

#[async_trait]
impl DocumentStore for AlwaysStale {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.0.get(collection, id).await
    }
    async fn set(&self, collection: &str, id: &str, doc: Document) -> StoreResult<()> {
        self.0.set(collection, id, doc).await
    }
    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<()> {
        self.0.update(collection, id, patch).await
    }
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.0.delete(collection, id).await
    }
    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        sort: Option<&Sort>,
    ) -> StoreResult<Vec<Document>> {
        self.0.query(collection, filters, sort).await
    }
    async fn atomic_batch(&self, _ops: Vec<BatchOp>) -> StoreResult<()> {
        Err(StoreError::VersionConflict {
            collection: TRANSACTIONS.to_string(),
            id: "stale".to_string(),
        })
    }
    async fn ensure_unique_index(&self, index: &UniqueIndex) -> StoreResult<()> {
        self.0.ensure_unique_index(index).await
    }
}

#[tokio::test]
async fn exhausted_retries_surface_as_conflict() {
    let inner = MemoryStore::new();
    let seeded = Transaction {
        id: "tx-1".to_string(),
        client_id: "client-1".to_string(),
        description: "Consulta".to_string(),
        extras: Vec::new(),
        total_amount: 100.0,
        transaction_type: TransactionType::OneTime,
        recurrence_day: None,
        due_date: None,
        amount_paid: 0.0,
        pending_amount: 100.0,
        status: TransactionStatus::ToCollect,
        notes: None,
        version: 0,
        created_at: at(2024, 3, 1, 9),
        updated_at: at(2024, 3, 1, 9),
    };
    inner
        .set(TRANSACTIONS, "tx-1", bson::to_document(&seeded).unwrap())
        .await
        .unwrap();

    let config = LedgerConfig {
        conflict_retries: 2,
        ..LedgerConfig::default()
    };
    let ledger = Ledger::open(
        Arc::new(AlwaysStale(inner)),
        Arc::new(FixedClock::new(at(2024, 3, 1, 10))),
        config,
    )
    .await
    .unwrap();

    let err = record_payment(&ledger, payment("tx-1", 10.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Conflict {
            entity: "transaction",
            ..
        }
    ));
}
