use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    error::LedgerResult,
    models::{AUDIT_LOG, AuditLogEntry},
    store::{BatchOp, Filter, Sort},
};

use super::{Ledger, encode, find, new_id};

/// Append-only record staged into the same batch as the change it describes.
pub(crate) struct AuditDraft<'a> {
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub client_id: Option<&'a str>,
    pub previous_value: Option<Value>,
    pub new_value: Option<Value>,
    pub performed_by: &'a str,
}

impl AuditDraft<'_> {
    pub(crate) fn into_op(self, now: DateTime<Utc>) -> LedgerResult<BatchOp> {
        let entry = AuditLogEntry {
            id: new_id(),
            action: self.action.to_string(),
            entity_type: self.entity_type.to_string(),
            entity_id: self.entity_id.to_string(),
            client_id: self.client_id.map(str::to_string),
            previous_value: self.previous_value,
            new_value: self.new_value,
            performed_by: self.performed_by.to_string(),
            timestamp: now,
        };
        Ok(BatchOp::insert(AUDIT_LOG, &entry.id, encode(&entry)?))
    }
}

/// Whole trail, newest first.
pub async fn list_audit_log(ledger: &Ledger) -> LedgerResult<Vec<AuditLogEntry>> {
    find(ledger, AUDIT_LOG, &[], Some(Sort::desc("timestamp"))).await
}

pub async fn audit_log_for_entity(
    ledger: &Ledger,
    entity_id: &str,
) -> LedgerResult<Vec<AuditLogEntry>> {
    find(
        ledger,
        AUDIT_LOG,
        &[Filter::eq("entity_id", entity_id)],
        Some(Sort::desc("timestamp")),
    )
    .await
}
