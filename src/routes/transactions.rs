use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    error::LedgerError,
    ledger::{self, Ledger, NewPayment, NewTransaction, TransactionEdit},
    models::{Payment, Transaction},
};

use super::ApiResult;

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    client_id: Option<String>,
}

pub async fn transactions_index(
    State(ledger): State<Arc<Ledger>>,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<Json<Vec<Transaction>>> {
    let client_id = query.client_id.as_deref().filter(|s| !s.trim().is_empty());
    Ok(Json(ledger::list_transactions(&ledger, client_id).await?))
}

pub async fn transactions_create(
    State(ledger): State<Arc<Ledger>>,
    Json(input): Json<NewTransaction>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let tx = ledger::create_transaction(&ledger, input).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn transactions_show(
    State(ledger): State<Arc<Ledger>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Transaction>> {
    let tx = ledger::get_transaction(&ledger, &id)
        .await?
        .ok_or_else(|| LedgerError::not_found("transaction", &id))?;
    Ok(Json(tx))
}

pub async fn transactions_update(
    State(ledger): State<Arc<Ledger>>,
    Path(id): Path<String>,
    Json(edit): Json<TransactionEdit>,
) -> ApiResult<Json<Transaction>> {
    Ok(Json(ledger::update_transaction(&ledger, &id, edit).await?))
}

pub async fn payments_index(
    State(ledger): State<Arc<Ledger>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Payment>>> {
    Ok(Json(
        ledger::list_payments_for_transaction(&ledger, &id).await?,
    ))
}

/// The transaction comes from the path; any id in the body is ignored.
pub async fn payments_create(
    State(ledger): State<Arc<Ledger>>,
    Path(id): Path<String>,
    Json(mut input): Json<NewPayment>,
) -> ApiResult<(StatusCode, Json<Payment>)> {
    input.transaction_id = id;
    let payment = ledger::record_payment(&ledger, input).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn sweep_overdue(
    State(ledger): State<Arc<Ledger>>,
) -> ApiResult<Json<Vec<Transaction>>> {
    Ok(Json(ledger::sweep_overdue(&ledger).await?))
}
