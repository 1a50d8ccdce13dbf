// ledger module: the Ledger handle, initialization, and re-exports of submodules.

use std::{future::Future, sync::Arc};

use anyhow::Result;
use bson::{Document, oid::ObjectId};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{info, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::{AppConfig, LedgerConfig, StoreKind},
    error::{LedgerError, LedgerResult},
    models::{ALL_COLLECTIONS, CHARGES},
    store::{DocumentStore, Filter, MemoryStore, MongoStore, Sort, StoreError, UniqueIndex},
};

mod audit;
mod charges;
mod clients;
mod payments;
mod reports;
mod sweeper;
mod transactions;

pub use audit::*;
pub use charges::*;
pub use clients::*;
pub use payments::*;
pub use reports::*;
pub use sweeper::*;
pub use transactions::*;

pub const DEFAULT_ACTOR: &str = "system";

/// At most one membership charge per business and billing month.
pub const MEMBERSHIP_PER_MONTH: UniqueIndex = UniqueIndex {
    name: "membership_per_business_month",
    collection: CHARGES,
    keys: &["business_id", "month"],
    partial: Some(("type", "membership")),
};

/// Handle to the ledger. Cheap to clone; share it through `Arc` or axum state.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl Ledger {
    /// Wraps a store and makes sure the indexes the ledger relies on exist.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> LedgerResult<Self> {
        store.ensure_unique_index(&MEMBERSHIP_PER_MONTH).await?;
        Ok(Self {
            store,
            clock,
            config,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

pub async fn init_ledger(config: &AppConfig) -> Result<Ledger> {
    let store: Arc<dyn DocumentStore> = match config.store {
        StoreKind::Mongo => Arc::new(
            MongoStore::connect(&config.mongodb_uri, &config.mongodb_db, &ALL_COLLECTIONS).await?,
        ),
        StoreKind::Memory => {
            warn!("using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let ledger = Ledger::open(store, Arc::new(SystemClock), config.ledger.clone()).await?;
    info!(store = ?config.store, "ledger ready");
    Ok(ledger)
}

pub(crate) fn new_id() -> String {
    ObjectId::new().to_hex()
}

pub(crate) fn actor_or_default(performed_by: Option<&str>) -> String {
    performed_by
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

pub(crate) fn encode<T: Serialize>(value: &T) -> LedgerResult<Document> {
    bson::to_document(value).map_err(|e| StoreError::from(e).into())
}

pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> LedgerResult<T> {
    bson::from_document(doc).map_err(|e| StoreError::from(e).into())
}

pub(crate) async fn fetch<T: DeserializeOwned>(
    ledger: &Ledger,
    collection: &str,
    id: &str,
) -> LedgerResult<Option<T>> {
    ledger
        .store
        .get(collection, id)
        .await?
        .map(decode)
        .transpose()
}

pub(crate) async fn find<T: DeserializeOwned>(
    ledger: &Ledger,
    collection: &str,
    filters: &[Filter],
    sort: Option<Sort>,
) -> LedgerResult<Vec<T>> {
    ledger
        .store
        .query(collection, filters, sort.as_ref())
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

pub(crate) fn ensure_positive(amount: f64, what: &str) -> LedgerResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::invalid(format!(
            "{what} must be a positive amount, got {amount}"
        )));
    }
    Ok(())
}

/// Runs a read-compute-write attempt, re-running it while the versioned write
/// loses to a concurrent writer, up to the configured retry count.
pub(crate) async fn with_conflict_retries<T, F, Fut>(
    ledger: &Ledger,
    entity: &'static str,
    id: &str,
    mut attempt: F,
) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(LedgerError::Persistence(StoreError::VersionConflict { .. })) => {
                if retries >= ledger.config.conflict_retries {
                    warn!(entity, id, retries, "giving up after repeated version conflicts");
                    return Err(LedgerError::Conflict {
                        entity,
                        id: id.to_string(),
                    });
                }
                retries += 1;
                warn!(entity, id, retry = retries, "version conflict, retrying");
            }
            other => return other,
        }
    }
}
