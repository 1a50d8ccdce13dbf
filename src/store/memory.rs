// store/memory.rs
// In-process DocumentStore used by tests and `LEDGER_STORE=memory` runs.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering as AtomicOrdering},
};

use async_trait::async_trait;
use bson::{Bson, Document};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    BatchOp, Direction, DocumentStore, Filter, Sort, StoreError, StoreResult, UniqueIndex,
};

type Collections = HashMap<String, BTreeMap<String, Document>>;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    indexes: RwLock<Vec<UniqueIndex>>,
    fail_next_batch: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `atomic_batch` call fail without applying anything.
    pub fn fail_next_batch(&self) {
        self.fail_next_batch.store(true, AtomicOrdering::SeqCst);
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn set(&self, collection: &str, id: &str, mut doc: Document) -> StoreResult<()> {
        doc.insert("_id", id);
        let indexes = self.indexes.read().await;
        let mut collections = self.collections.write().await;
        let mut staged = collections.get(collection).cloned().unwrap_or_default();
        staged.insert(id.to_string(), doc);
        check_indexes(&indexes, collection, &staged)?;
        collections.insert(collection.to_string(), staged);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<()> {
        let indexes = self.indexes.read().await;
        let mut collections = self.collections.write().await;
        let mut staged = collections.get(collection).cloned().unwrap_or_default();
        apply_update(&mut staged, collection, id, patch, None)?;
        check_indexes(&indexes, collection, &staged)?;
        collections.insert(collection.to_string(), staged);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        if let Some(c) = collections.get_mut(collection) {
            c.remove(id);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        sort: Option<&Sort>,
    ) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut items: Vec<Document> = collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|doc| filters.iter().all(|f| matches_filter(doc, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = sort {
            items.sort_by(|a, b| {
                let ord = compare_bson(
                    a.get(&sort.field).unwrap_or(&Bson::Null),
                    b.get(&sort.field).unwrap_or(&Bson::Null),
                )
                .unwrap_or(Ordering::Equal);
                match sort.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        Ok(items)
    }

    async fn atomic_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        if self.fail_next_batch.swap(false, AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("injected batch failure".into()));
        }

        let indexes = self.indexes.read().await;
        let mut collections = self.collections.write().await;

        // Stage on copies of the touched collections; publish only if every op applies.
        let mut staged: Collections = HashMap::new();
        let op_count = ops.len();
        for op in ops {
            match op {
                BatchOp::Insert {
                    collection,
                    id,
                    mut doc,
                } => {
                    let target = stage(&mut staged, &collections, &collection);
                    if target.contains_key(&id) {
                        return Err(StoreError::Duplicate {
                            collection,
                            key: id,
                        });
                    }
                    doc.insert("_id", id.as_str());
                    target.insert(id, doc);
                }
                BatchOp::Update {
                    collection,
                    id,
                    patch,
                    expected_version,
                } => {
                    let target = stage(&mut staged, &collections, &collection);
                    apply_update(target, &collection, &id, patch, expected_version)?;
                }
                BatchOp::Delete { collection, id } => {
                    let target = stage(&mut staged, &collections, &collection);
                    target.remove(&id);
                }
            }
        }

        for (name, docs) in &staged {
            check_indexes(&indexes, name, docs)?;
        }
        collections.extend(staged);
        debug!(ops = op_count, "memory batch committed");
        Ok(())
    }

    async fn ensure_unique_index(&self, index: &UniqueIndex) -> StoreResult<()> {
        let mut indexes = self.indexes.write().await;
        if !indexes.iter().any(|i| i.name == index.name) {
            indexes.push(index.clone());
        }
        Ok(())
    }
}

fn stage<'a>(
    staged: &'a mut Collections,
    live: &Collections,
    collection: &str,
) -> &'a mut BTreeMap<String, Document> {
    staged
        .entry(collection.to_string())
        .or_insert_with(|| live.get(collection).cloned().unwrap_or_default())
}

fn apply_update(
    docs: &mut BTreeMap<String, Document>,
    collection: &str,
    id: &str,
    patch: Document,
    expected_version: Option<i64>,
) -> StoreResult<()> {
    let Some(doc) = docs.get_mut(id) else {
        return Err(match expected_version {
            Some(_) => StoreError::VersionConflict {
                collection: collection.to_string(),
                id: id.to_string(),
            },
            None => StoreError::Missing {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        });
    };

    if let Some(expected) = expected_version {
        let current = doc.get("version").and_then(as_i64).unwrap_or(0);
        if current != expected {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
    }

    for (key, value) in patch {
        doc.insert(key, value);
    }
    Ok(())
}

fn check_indexes(
    indexes: &[UniqueIndex],
    collection: &str,
    docs: &BTreeMap<String, Document>,
) -> StoreResult<()> {
    for index in indexes.iter().filter(|i| i.collection == collection) {
        let mut seen = HashSet::new();
        for doc in docs.values().filter(|d| index.applies_to(d)) {
            let key = index.key_of(doc);
            if !seen.insert(key.clone()) {
                return Err(StoreError::Duplicate {
                    collection: collection.to_string(),
                    key,
                });
            }
        }
    }
    Ok(())
}

fn matches_filter(doc: &Document, filter: &Filter) -> bool {
    let value = doc.get(filter.field()).unwrap_or(&Bson::Null);
    match filter {
        Filter::Eq(_, expected) => bson_eq(value, expected),
        Filter::In(_, options) => options.iter().any(|o| bson_eq(value, o)),
        Filter::Lt(_, bound) => compare_bson(value, bound) == Some(Ordering::Less),
        Filter::Lte(_, bound) => matches!(
            compare_bson(value, bound),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Filter::Gt(_, bound) => compare_bson(value, bound) == Some(Ordering::Greater),
        Filter::Gte(_, bound) => matches!(
            compare_bson(value, bound),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    a == b || compare_bson(a, b) == Some(Ordering::Equal)
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Ordering between comparable values; `None` for mismatched types (never matches a range filter).
fn compare_bson(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}
