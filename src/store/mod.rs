//! Persistence substrate.
//!
//! The ledger only talks to storage through [`DocumentStore`]: single-document
//! get/set/update/delete, filtered queries, and all-or-nothing batches. All of
//! the ledger's atomicity guarantees come from [`DocumentStore::atomic_batch`].

use async_trait::async_trait;
use bson::{Bson, Document};
use thiserror::Error;

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("failed to decode document: {0}")]
    Decode(#[from] bson::de::Error),

    /// An expected-version update matched nothing; the whole batch was discarded.
    #[error("version conflict on {collection}/{id}")]
    VersionConflict { collection: String, id: String },

    /// A unique key (primary id or declared index) would be violated.
    #[error("duplicate key in {collection}: {key}")]
    Duplicate { collection: String, key: String },

    #[error("document {collection}/{id} does not exist")]
    Missing { collection: String, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Single-field predicate. A query matches documents satisfying every filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Bson),
    In(String, Vec<Bson>),
    Lt(String, Bson),
    Lte(String, Bson),
    Gt(String, Bson),
    Gte(String, Bson),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Bson>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn is_in<V: Into<Bson>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn lt(field: &str, value: impl Into<Bson>) -> Self {
        Filter::Lt(field.to_string(), value.into())
    }

    pub fn lte(field: &str, value: impl Into<Bson>) -> Self {
        Filter::Lte(field.to_string(), value.into())
    }

    pub fn gt(field: &str, value: impl Into<Bson>) -> Self {
        Filter::Gt(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Bson>) -> Self {
        Filter::Gte(field.to_string(), value.into())
    }

    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(f, _)
            | Filter::In(f, _)
            | Filter::Lt(f, _)
            | Filter::Lte(f, _)
            | Filter::Gt(f, _)
            | Filter::Gte(f, _) => f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Sort {
            field: field.to_string(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Sort {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Insert {
        collection: String,
        id: String,
        doc: Document,
    },
    /// `$set` semantics. With `expected_version`, the stored document's
    /// `version` field must equal it or the whole batch fails.
    Update {
        collection: String,
        id: String,
        patch: Document,
        expected_version: Option<i64>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl BatchOp {
    pub fn insert(collection: &str, id: &str, doc: Document) -> Self {
        BatchOp::Insert {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        }
    }

    pub fn update_versioned(collection: &str, id: &str, patch: Document, expected: i64) -> Self {
        BatchOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
            expected_version: Some(expected),
        }
    }

    pub fn update(collection: &str, id: &str, patch: Document) -> Self {
        BatchOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
            expected_version: None,
        }
    }

    /// Collection and document id the op writes to.
    pub fn target(&self) -> (&str, &str) {
        match self {
            BatchOp::Insert { collection, id, .. }
            | BatchOp::Update { collection, id, .. }
            | BatchOp::Delete { collection, id } => (collection, id),
        }
    }
}

/// Uniqueness constraint over `keys`, optionally restricted to documents whose
/// `partial.0` field equals `partial.1`.
#[derive(Debug, Clone)]
pub struct UniqueIndex {
    pub name: &'static str,
    pub collection: &'static str,
    pub keys: &'static [&'static str],
    pub partial: Option<(&'static str, &'static str)>,
}

impl UniqueIndex {
    pub(crate) fn applies_to(&self, doc: &Document) -> bool {
        match self.partial {
            Some((field, value)) => doc.get_str(field).map(|v| v == value).unwrap_or(false),
            None => true,
        }
    }

    pub(crate) fn key_of(&self, doc: &Document) -> String {
        self.keys
            .iter()
            .map(|k| doc.get(*k).map(|v| v.to_string()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Insert or replace the whole document.
    async fn set(&self, collection: &str, id: &str, doc: Document) -> StoreResult<()>;

    /// `$set` the given fields on an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<()>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        sort: Option<&Sort>,
    ) -> StoreResult<Vec<Document>>;

    /// Apply every op or none of them.
    async fn atomic_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()>;

    async fn ensure_unique_index(&self, index: &UniqueIndex) -> StoreResult<()>;
}
