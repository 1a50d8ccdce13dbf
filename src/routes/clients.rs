use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    error::LedgerError,
    ledger::{self, Ledger, NewClient},
    models::Client,
};

use super::ApiResult;

pub async fn clients_index(State(ledger): State<Arc<Ledger>>) -> ApiResult<Json<Vec<Client>>> {
    Ok(Json(ledger::list_clients(&ledger).await?))
}

pub async fn clients_create(
    State(ledger): State<Arc<Ledger>>,
    Json(input): Json<NewClient>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let client = ledger::create_client(&ledger, input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn clients_show(
    State(ledger): State<Arc<Ledger>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Client>> {
    let client = ledger::get_client(&ledger, &id)
        .await?
        .ok_or_else(|| LedgerError::not_found("client", &id))?;
    Ok(Json(client))
}

pub async fn clients_delete(
    State(ledger): State<Arc<Ledger>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    ledger::delete_client(&ledger, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
