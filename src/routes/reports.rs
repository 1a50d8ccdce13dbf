use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    ledger::{self, KpiSummary, Ledger},
    models::AuditLogEntry,
    projection::Projection,
};

use super::ApiResult;

const DEFAULT_PROJECTION_DAYS: u32 = 30;

#[derive(Debug, Deserialize)]
pub struct ProjectionQuery {
    days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct KpiQuery {
    month: Option<String>,
    days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    entity_id: Option<String>,
}

pub async fn projections(
    State(ledger): State<Arc<Ledger>>,
    Query(query): Query<ProjectionQuery>,
) -> ApiResult<Json<Projection>> {
    let days = query.days.unwrap_or(DEFAULT_PROJECTION_DAYS);
    Ok(Json(ledger::project(&ledger, days).await?))
}

pub async fn kpis(
    State(ledger): State<Arc<Ledger>>,
    Query(query): Query<KpiQuery>,
) -> ApiResult<Json<KpiSummary>> {
    let days = query.days.unwrap_or(DEFAULT_PROJECTION_DAYS);
    let summary = ledger::kpi_summary(&ledger, query.month.as_deref(), days).await?;
    Ok(Json(summary))
}

pub async fn audit_index(
    State(ledger): State<Arc<Ledger>>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditLogEntry>>> {
    let entries = match query.entity_id.as_deref() {
        Some(id) if !id.trim().is_empty() => ledger::audit_log_for_entity(&ledger, id).await?,
        _ => ledger::list_audit_log(&ledger).await?,
    };
    Ok(Json(entries))
}
