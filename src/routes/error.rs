use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::error::LedgerError;

/// Ledger failure rendered as `{code, message}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LedgerError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            LedgerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            LedgerError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
            LedgerError::Persistence(err) => {
                error!(error = %err, "persistence failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILURE")
            }
        };
        let body = ErrorBody {
            code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
