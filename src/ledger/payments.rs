// Payment Recorder: applies a payment to a transaction as one atomic unit.
//
// Each attempt reads the transaction and commits the payment together with the
// versioned balance update and its audit entry in one batch. If a concurrent
// writer bumped `version` first, the batch is rejected whole and the attempt is
// recomputed from fresh state.

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    config::OverpaymentPolicy,
    error::{LedgerError, LedgerResult},
    models::{PAYMENTS, Payment, PaymentMethod, TRANSACTIONS, timestamp},
    money::{exceeds, round_cents},
    status::derive_status,
    store::{BatchOp, Filter, Sort},
};

use super::{
    Ledger, actor_or_default, audit::AuditDraft, encode, ensure_positive, find, new_id,
    transactions::require_transaction, with_conflict_retries,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    #[serde(default)]
    pub transaction_id: String,
    /// Must match the transaction's client when given.
    #[serde(default)]
    pub client_id: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub performed_by: Option<String>,
}

/// Records money received against a transaction.
///
/// Callers that charge through the payment gateway must only call this after
/// the gateway reported success; the ledger never talks to the gateway.
pub async fn record_payment(ledger: &Ledger, input: NewPayment) -> LedgerResult<Payment> {
    let input = NewPayment {
        amount: round_cents(input.amount),
        ..input
    };
    ensure_positive(input.amount, "payment amount")?;
    let input = &input;
    with_conflict_retries(ledger, "transaction", &input.transaction_id, move || {
        record_payment_once(ledger, input)
    })
    .await
}

async fn record_payment_once(ledger: &Ledger, input: &NewPayment) -> LedgerResult<Payment> {
    let tx = require_transaction(ledger, &input.transaction_id).await?;

    if let Some(client_id) = input.client_id.as_deref() {
        if client_id != tx.client_id {
            return Err(LedgerError::invalid(format!(
                "transaction {} belongs to client {}, not {client_id}",
                tx.id, tx.client_id
            )));
        }
    }

    let new_amount_paid = round_cents(tx.amount_paid + input.amount);
    if ledger.config().overpayment == OverpaymentPolicy::Reject
        && exceeds(new_amount_paid, tx.total_amount)
    {
        return Err(LedgerError::invalid(format!(
            "payment of {} exceeds the pending amount {} of transaction {}",
            input.amount, tx.pending_amount, tx.id
        )));
    }
    let new_pending = round_cents(tx.total_amount - new_amount_paid);
    let now = ledger.now();
    let new_status = derive_status(new_amount_paid, tx.total_amount, tx.due_date, now);

    let payment = Payment {
        id: new_id(),
        transaction_id: tx.id.clone(),
        client_id: tx.client_id.clone(),
        amount: input.amount,
        method: input.method,
        reference: input.reference.clone(),
        notes: input.notes.clone(),
        created_at: now,
    };

    let actor = actor_or_default(input.performed_by.as_deref());
    let audit = AuditDraft {
        action: "payment_recorded",
        entity_type: "transaction",
        entity_id: &tx.id,
        client_id: Some(&tx.client_id),
        previous_value: Some(json!({
            "amount_paid": tx.amount_paid,
            "pending_amount": tx.pending_amount,
            "status": tx.status.as_str(),
        })),
        new_value: Some(json!({
            "amount_paid": new_amount_paid,
            "pending_amount": new_pending,
            "status": new_status.as_str(),
            "payment_amount": input.amount,
            "payment_id": payment.id,
        })),
        performed_by: &actor,
    }
    .into_op(now)?;

    let patch = bson::doc! {
        "amount_paid": new_amount_paid,
        "pending_amount": new_pending,
        "status": new_status.as_str(),
        "updated_at": timestamp::format(&now),
        "version": tx.version + 1,
    };

    ledger
        .store()
        .atomic_batch(vec![
            BatchOp::insert(PAYMENTS, &payment.id, encode(&payment)?),
            BatchOp::update_versioned(TRANSACTIONS, &tx.id, patch, tx.version),
            audit,
        ])
        .await?;

    info!(
        transaction_id = %tx.id,
        payment_id = %payment.id,
        amount = input.amount,
        amount_paid = new_amount_paid,
        status = new_status.as_str(),
        "payment recorded"
    );
    Ok(payment)
}

pub async fn list_payments_for_transaction(
    ledger: &Ledger,
    transaction_id: &str,
) -> LedgerResult<Vec<Payment>> {
    find(
        ledger,
        PAYMENTS,
        &[Filter::eq("transaction_id", transaction_id)],
        Some(Sort::asc("created_at")),
    )
    .await
}

pub async fn list_payments_for_client(
    ledger: &Ledger,
    client_id: &str,
) -> LedgerResult<Vec<Payment>> {
    find(
        ledger,
        PAYMENTS,
        &[Filter::eq("client_id", client_id)],
        Some(Sort::asc("created_at")),
    )
    .await
}

pub async fn list_payments(ledger: &Ledger) -> LedgerResult<Vec<Payment>> {
    find(ledger, PAYMENTS, &[], Some(Sort::asc("created_at"))).await
}
