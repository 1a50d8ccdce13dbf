// Billing ledger: client transactions, payments, status sweeps, projections,
// business membership charges and an append-only audit trail over a document store.

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod money;
pub mod projection;
pub mod routes;
pub mod status;
pub mod store;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, init_ledger};
