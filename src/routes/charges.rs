use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    ledger::{self, Ledger, NewBusiness, NewCharge, month_key},
    models::{Business, Charge},
};

use super::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ChargesQuery {
    month: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AbonoForm {
    amount: f64,
    #[serde(default)]
    performed_by: Option<String>,
}

pub async fn businesses_index(
    State(ledger): State<Arc<Ledger>>,
) -> ApiResult<Json<Vec<Business>>> {
    Ok(Json(ledger::list_businesses(&ledger).await?))
}

pub async fn businesses_create(
    State(ledger): State<Arc<Ledger>>,
    Json(input): Json<NewBusiness>,
) -> ApiResult<(StatusCode, Json<Business>)> {
    let business = ledger::create_business(&ledger, input).await?;
    Ok((StatusCode::CREATED, Json(business)))
}

pub async fn charges_index(
    State(ledger): State<Arc<Ledger>>,
    Query(query): Query<ChargesQuery>,
) -> ApiResult<Json<Vec<Charge>>> {
    let month = query
        .month
        .unwrap_or_else(|| month_key(ledger.now().date_naive()));
    Ok(Json(ledger::list_charges(&ledger, &month).await?))
}

pub async fn charges_create(
    State(ledger): State<Arc<Ledger>>,
    Json(input): Json<NewCharge>,
) -> ApiResult<(StatusCode, Json<Charge>)> {
    let charge = ledger::create_charge(&ledger, input).await?;
    Ok((StatusCode::CREATED, Json(charge)))
}

pub async fn memberships_ensure(
    State(ledger): State<Arc<Ledger>>,
    Path(month): Path<String>,
) -> ApiResult<Json<Vec<Charge>>> {
    Ok(Json(ledger::ensure_memberships_for_all(&ledger, &month).await?))
}

pub async fn abonos_create(
    State(ledger): State<Arc<Ledger>>,
    Path(id): Path<String>,
    Json(form): Json<AbonoForm>,
) -> ApiResult<Json<Charge>> {
    let charge =
        ledger::add_abono(&ledger, &id, form.amount, form.performed_by.as_deref()).await?;
    Ok(Json(charge))
}
