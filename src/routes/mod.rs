// routes/mod.rs
// JSON router over the ledger.
//
// Endpoints:
// - POST/GET  /clients, GET/DELETE /clients/{id}
// - POST/GET  /transactions (?client_id=), GET/PATCH /transactions/{id}
// - POST/GET  /transactions/{id}/payments
// - POST      /sweeps/overdue
// - GET       /projections?days=, /kpis?month=&days=
// - POST/GET  /businesses
// - POST      /charges, GET /charges?month=, POST /charges/memberships/{month},
//             POST /charges/{id}/abonos
// - GET       /audit (?entity_id=)

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::ledger::Ledger;

pub mod charges;
pub mod clients;
pub mod error;
pub mod reports;
pub mod transactions;

pub use error::{ApiError, ApiResult};

pub fn router(ledger: Arc<Ledger>) -> Router {
    Router::new()
        .route(
            "/clients",
            get(clients::clients_index).post(clients::clients_create),
        )
        .route(
            "/clients/{id}",
            get(clients::clients_show).delete(clients::clients_delete),
        )
        .route(
            "/transactions",
            get(transactions::transactions_index).post(transactions::transactions_create),
        )
        .route(
            "/transactions/{id}",
            get(transactions::transactions_show).patch(transactions::transactions_update),
        )
        .route(
            "/transactions/{id}/payments",
            get(transactions::payments_index).post(transactions::payments_create),
        )
        .route("/sweeps/overdue", post(transactions::sweep_overdue))
        .route("/projections", get(reports::projections))
        .route("/kpis", get(reports::kpis))
        .route("/audit", get(reports::audit_index))
        .route(
            "/businesses",
            get(charges::businesses_index).post(charges::businesses_create),
        )
        .route(
            "/charges",
            get(charges::charges_index).post(charges::charges_create),
        )
        .route(
            "/charges/memberships/{month}",
            post(charges::memberships_ensure),
        )
        .route("/charges/{id}/abonos", post(charges::abonos_create))
        .with_state(ledger)
}
