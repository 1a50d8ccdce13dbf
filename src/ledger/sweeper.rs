use serde_json::json;
use tracing::{debug, info};

use crate::{
    error::LedgerResult,
    models::{TRANSACTIONS, Transaction, TransactionStatus, timestamp},
    status::derive_for,
    store::{BatchOp, Filter},
};

use super::{DEFAULT_ACTOR, Ledger, audit::AuditDraft, find, with_conflict_retries};

/// Promotes open transactions whose due date has passed.
///
/// Candidates are `to_collect`/`partially_paid` transactions due before now; each
/// gets its status re-derived and only the ones that actually change are written,
/// all in one batch. A partially paid transaction stays `partially_paid` after its
/// due date, so the sweep never contradicts the status derivation. Running it
/// again without intervening changes updates nothing.
pub async fn sweep_overdue(ledger: &Ledger) -> LedgerResult<Vec<Transaction>> {
    with_conflict_retries(ledger, "transaction", "overdue-sweep", move || {
        sweep_overdue_once(ledger)
    })
    .await
}

async fn sweep_overdue_once(ledger: &Ledger) -> LedgerResult<Vec<Transaction>> {
    let now = ledger.now();
    let candidates: Vec<Transaction> = find(
        ledger,
        TRANSACTIONS,
        &[
            Filter::is_in(
                "status",
                [
                    TransactionStatus::ToCollect.as_str(),
                    TransactionStatus::PartiallyPaid.as_str(),
                ],
            ),
            Filter::lt("due_date", timestamp::format(&now)),
        ],
        None,
    )
    .await?;

    let mut ops = Vec::new();
    let mut updated = Vec::new();
    for mut tx in candidates {
        let status = derive_for(&tx, now);
        if status == tx.status {
            continue;
        }

        let audit = AuditDraft {
            action: "status_swept",
            entity_type: "transaction",
            entity_id: &tx.id,
            client_id: Some(&tx.client_id),
            previous_value: Some(json!({ "status": tx.status.as_str() })),
            new_value: Some(json!({ "status": status.as_str() })),
            performed_by: DEFAULT_ACTOR,
        }
        .into_op(now)?;
        ops.push(BatchOp::update_versioned(
            TRANSACTIONS,
            &tx.id,
            bson::doc! {
                "status": status.as_str(),
                "updated_at": timestamp::format(&now),
                "version": tx.version + 1,
            },
            tx.version,
        ));
        ops.push(audit);

        tx.status = status;
        tx.updated_at = now;
        tx.version += 1;
        updated.push(tx);
    }

    if ops.is_empty() {
        debug!("overdue sweep found nothing to update");
        return Ok(updated);
    }

    ledger.store().atomic_batch(ops).await?;
    info!(count = updated.len(), "overdue sweep committed");
    Ok(updated)
}
