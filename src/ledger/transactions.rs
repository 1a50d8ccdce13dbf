use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    error::{LedgerError, LedgerResult},
    models::{Extra, TRANSACTIONS, Transaction, TransactionType, timestamp},
    money::round_cents,
    status::derive_status,
    store::{BatchOp, Filter, Sort},
};

use super::{
    Ledger, actor_or_default, audit::AuditDraft, encode, fetch, find, new_id,
    with_conflict_retries,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub client_id: String,
    pub description: String,
    /// Base amount before extras.
    pub amount: f64,
    #[serde(default)]
    pub extras: Vec<Extra>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub recurrence_day: Option<u32>,
    #[serde(default, with = "timestamp::option")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub performed_by: Option<String>,
}

/// Manual edit. Amounts and status are not editable here: amounts only move
/// through payments and status is always re-derived.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionEdit {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clear_due_date: bool,
    #[serde(default)]
    pub recurrence_day: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub performed_by: Option<String>,
}

pub async fn create_transaction(
    ledger: &Ledger,
    input: NewTransaction,
) -> LedgerResult<Transaction> {
    let description = input.description.trim();
    if input.client_id.trim().is_empty() {
        return Err(LedgerError::invalid("client_id is required"));
    }
    if description.is_empty() {
        return Err(LedgerError::invalid("description is required"));
    }
    if !input.amount.is_finite() || input.amount < 0.0 {
        return Err(LedgerError::invalid("amount must be a non-negative number"));
    }
    for extra in &input.extras {
        if !extra.amount.is_finite() || extra.amount < 0.0 {
            return Err(LedgerError::invalid(format!(
                "extra `{}` must have a non-negative amount",
                extra.description
            )));
        }
    }
    let total_amount =
        round_cents(input.amount + input.extras.iter().map(|e| e.amount).sum::<f64>());
    if total_amount <= 0.0 {
        return Err(LedgerError::invalid("total amount must be positive"));
    }
    validate_schedule(
        input.transaction_type,
        input.recurrence_day,
        input.due_date,
    )?;

    let now = ledger.now();
    let tx = Transaction {
        id: new_id(),
        client_id: input.client_id.trim().to_string(),
        description: description.to_string(),
        extras: input.extras,
        total_amount,
        transaction_type: input.transaction_type,
        recurrence_day: input.recurrence_day,
        due_date: input.due_date,
        amount_paid: 0.0,
        pending_amount: total_amount,
        status: derive_status(0.0, total_amount, input.due_date, now),
        notes: input.notes,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    let actor = actor_or_default(input.performed_by.as_deref());
    let audit = AuditDraft {
        action: "transaction_created",
        entity_type: "transaction",
        entity_id: &tx.id,
        client_id: Some(&tx.client_id),
        previous_value: None,
        new_value: Some(json!({
            "total_amount": tx.total_amount,
            "type": tx.transaction_type.as_str(),
            "status": tx.status.as_str(),
        })),
        performed_by: &actor,
    }
    .into_op(now)?;

    ledger
        .store()
        .atomic_batch(vec![
            BatchOp::insert(TRANSACTIONS, &tx.id, encode(&tx)?),
            audit,
        ])
        .await?;
    info!(transaction_id = %tx.id, total = tx.total_amount, "transaction created");
    Ok(tx)
}

pub async fn get_transaction(ledger: &Ledger, id: &str) -> LedgerResult<Option<Transaction>> {
    fetch(ledger, TRANSACTIONS, id).await
}

pub(crate) async fn require_transaction(ledger: &Ledger, id: &str) -> LedgerResult<Transaction> {
    get_transaction(ledger, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("transaction", id))
}

/// All transactions, or only one client's when `client_id` is given.
pub async fn list_transactions(
    ledger: &Ledger,
    client_id: Option<&str>,
) -> LedgerResult<Vec<Transaction>> {
    let filters: Vec<Filter> = client_id
        .map(|id| vec![Filter::eq("client_id", id)])
        .unwrap_or_default();
    find(ledger, TRANSACTIONS, &filters, Some(Sort::asc("created_at"))).await
}

pub async fn update_transaction(
    ledger: &Ledger,
    id: &str,
    edit: TransactionEdit,
) -> LedgerResult<Transaction> {
    let edit = &edit;
    with_conflict_retries(ledger, "transaction", id, move || {
        update_transaction_once(ledger, id, edit)
    })
    .await
}

async fn update_transaction_once(
    ledger: &Ledger,
    id: &str,
    edit: &TransactionEdit,
) -> LedgerResult<Transaction> {
    let before = require_transaction(ledger, id).await?;
    let mut after = before.clone();

    if let Some(description) = edit.description.as_deref() {
        let description = description.trim();
        if description.is_empty() {
            return Err(LedgerError::invalid("description cannot be empty"));
        }
        after.description = description.to_string();
    }
    if edit.clear_due_date {
        after.due_date = None;
    } else if edit.due_date.is_some() {
        after.due_date = edit.due_date;
    }
    if edit.recurrence_day.is_some() {
        after.recurrence_day = edit.recurrence_day;
    }
    if edit.notes.is_some() {
        after.notes = edit.notes.clone();
    }
    validate_schedule(after.transaction_type, after.recurrence_day, after.due_date)?;

    let now = ledger.now();
    after.status = derive_status(after.amount_paid, after.total_amount, after.due_date, now);
    after.updated_at = now;
    after.version = before.version + 1;

    let actor = actor_or_default(edit.performed_by.as_deref());
    let audit = AuditDraft {
        action: "transaction_updated",
        entity_type: "transaction",
        entity_id: id,
        client_id: Some(&before.client_id),
        previous_value: Some(editable_snapshot(&before)),
        new_value: Some(editable_snapshot(&after)),
        performed_by: &actor,
    }
    .into_op(now)?;

    let patch = bson::doc! {
        "description": after.description.as_str(),
        "due_date": after.due_date.as_ref().map(timestamp::format),
        "recurrence_day": after.recurrence_day.map(i64::from),
        "notes": after.notes.clone(),
        "status": after.status.as_str(),
        "updated_at": timestamp::format(&now),
        "version": after.version,
    };

    ledger
        .store()
        .atomic_batch(vec![
            BatchOp::update_versioned(TRANSACTIONS, id, patch, before.version),
            audit,
        ])
        .await?;
    info!(transaction_id = id, status = after.status.as_str(), "transaction updated");
    Ok(after)
}

fn editable_snapshot(tx: &Transaction) -> serde_json::Value {
    json!({
        "description": tx.description,
        "due_date": tx.due_date.as_ref().map(timestamp::format),
        "recurrence_day": tx.recurrence_day,
        "notes": tx.notes,
        "status": tx.status.as_str(),
    })
}

fn validate_schedule(
    kind: TransactionType,
    recurrence_day: Option<u32>,
    due_date: Option<DateTime<Utc>>,
) -> LedgerResult<()> {
    match kind {
        TransactionType::Recurring => {
            match recurrence_day {
                Some(day) if (1..=31).contains(&day) => {}
                Some(day) => {
                    return Err(LedgerError::invalid(format!(
                        "recurrence_day must be between 1 and 31, got {day}"
                    )));
                }
                None => {
                    return Err(LedgerError::invalid(
                        "recurring transactions need a recurrence_day",
                    ));
                }
            }
            if due_date.is_some() {
                return Err(LedgerError::invalid(
                    "due_date only applies to one_time transactions",
                ));
            }
        }
        TransactionType::OneTime => {
            if recurrence_day.is_some() {
                return Err(LedgerError::invalid(
                    "recurrence_day only applies to recurring transactions",
                ));
            }
        }
    }
    Ok(())
}
