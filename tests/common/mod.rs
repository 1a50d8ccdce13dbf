#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use billing_ledger::{
    clock::FixedClock,
    config::LedgerConfig,
    ledger::{Ledger, NewClient, NewPayment, NewTransaction, create_client},
    models::{PaymentMethod, TransactionType},
    store::MemoryStore,
};

/// Ledger over a fresh in-memory store with a hand-driven clock.
pub struct TestContext {
    pub ledger: Ledger,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub async fn setup_ledger() -> TestContext {
    setup_with(LedgerConfig::default(), at(2024, 3, 1, 9)).await
}

pub async fn setup_with(config: LedgerConfig, now: DateTime<Utc>) -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(now));
    let ledger = Ledger::open(store.clone(), clock.clone(), config)
        .await
        .expect("ledger opens over memory store");
    TestContext {
        ledger,
        store,
        clock,
    }
}

pub async fn seed_client(ctx: &TestContext, name: &str) -> String {
    create_client(
        &ctx.ledger,
        NewClient {
            name: name.to_string(),
            email: None,
            phone: None,
            notes: None,
        },
    )
    .await
    .expect("client created")
    .id
}

pub fn one_time(client_id: &str, amount: f64, due_date: Option<DateTime<Utc>>) -> NewTransaction {
    NewTransaction {
        client_id: client_id.to_string(),
        description: "Consulta".to_string(),
        amount,
        extras: Vec::new(),
        transaction_type: TransactionType::OneTime,
        recurrence_day: None,
        due_date,
        notes: None,
        performed_by: None,
    }
}

pub fn recurring(client_id: &str, amount: f64, day: u32) -> NewTransaction {
    NewTransaction {
        client_id: client_id.to_string(),
        description: "Mensualidad".to_string(),
        amount,
        extras: Vec::new(),
        transaction_type: TransactionType::Recurring,
        recurrence_day: Some(day),
        due_date: None,
        notes: None,
        performed_by: None,
    }
}

pub fn payment(transaction_id: &str, amount: f64) -> NewPayment {
    NewPayment {
        transaction_id: transaction_id.to_string(),
        client_id: None,
        amount,
        method: PaymentMethod::Cash,
        reference: None,
        notes: None,
        performed_by: Some("cajero@example.com".to_string()),
    }
}
