// store/mongo.rs
// MongoDB-backed DocumentStore. Atomic batches run inside a client session
// transaction, so the deployment must be a replica set (or sharded cluster).
// A transaction the server aborts as transient (write conflicts between
// concurrent sessions) surfaces as a version conflict, so ledger writes retry it
// like a stale `version`.

use async_trait::async_trait;
use bson::{Document, doc};
use futures::stream::TryStreamExt;
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    error::{ErrorKind, TRANSIENT_TRANSACTION_ERROR, WriteFailure},
    options::IndexOptions,
};
use tracing::{debug, info, warn};

use super::{
    BatchOp, Direction, DocumentStore, Filter, Sort, StoreError, StoreResult, UniqueIndex,
};

const DUPLICATE_KEY_CODE: i32 = 11000;
const WRITE_CONFLICT_CODE: i32 = 112;

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str, collections: &[&str]) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(db_name);
        let store = Self { client, db };
        store.ensure_collections(collections).await?;
        info!(db = db_name, "connected to mongodb");
        Ok(store)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    /// Collections must exist before they are written inside a transaction.
    async fn ensure_collections(&self, names: &[&str]) -> StoreResult<()> {
        let existing = self.db.list_collection_names().await?;
        for name in names {
            if !existing.iter().any(|n| n == name) {
                self.db.create_collection(*name).await?;
            }
        }
        Ok(())
    }

    async fn apply_ops(&self, session: &mut ClientSession, ops: Vec<BatchOp>) -> StoreResult<()> {
        for op in ops {
            match op {
                BatchOp::Insert {
                    collection,
                    id,
                    mut doc,
                } => {
                    doc.insert("_id", id.as_str());
                    self.collection(&collection)
                        .insert_one(doc)
                        .session(&mut *session)
                        .await
                        .map_err(|err| map_write_error(err, &collection, &id))?;
                }
                BatchOp::Update {
                    collection,
                    id,
                    patch,
                    expected_version,
                } => {
                    let mut filter = doc! { "_id": id.as_str() };
                    if let Some(version) = expected_version {
                        filter.insert("version", version);
                    }
                    let res = self
                        .collection(&collection)
                        .update_one(filter, doc! { "$set": patch })
                        .session(&mut *session)
                        .await
                        .map_err(|err| map_write_error(err, &collection, &id))?;
                    if res.matched_count == 0 {
                        return Err(match expected_version {
                            Some(_) => StoreError::VersionConflict { collection, id },
                            None => StoreError::Missing { collection, id },
                        });
                    }
                }
                BatchOp::Delete { collection, id } => {
                    self.collection(&collection)
                        .delete_one(doc! { "_id": id.as_str() })
                        .session(&mut *session)
                        .await
                        .map_err(|err| map_write_error(err, &collection, &id))?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one(doc! { "_id": id })
            .await
            .map_err(Into::into)
    }

    async fn set(&self, collection: &str, id: &str, mut doc: Document) -> StoreResult<()> {
        doc.insert("_id", id);
        self.collection(collection)
            .replace_one(doc! { "_id": id }, doc)
            .upsert(true)
            .await
            .map_err(|err| map_duplicate(err, collection, id))?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> StoreResult<()> {
        let res = self
            .collection(collection)
            .update_one(doc! { "_id": id }, doc! { "$set": patch })
            .await
            .map_err(|err| map_duplicate(err, collection, id))?;
        if res.matched_count == 0 {
            return Err(StoreError::Missing {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.collection(collection)
            .delete_one(doc! { "_id": id })
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        sort: Option<&Sort>,
    ) -> StoreResult<Vec<Document>> {
        let coll = self.collection(collection);
        let mut find = coll.find(to_mongo_filter(filters));
        if let Some(sort) = sort {
            let direction = match sort.direction {
                Direction::Ascending => 1,
                Direction::Descending => -1,
            };
            let mut order = Document::new();
            order.insert(sort.field.as_str(), direction);
            find = find.sort(order);
        }

        let mut cursor = find.await?;
        let mut items = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            items.push(doc);
        }
        Ok(items)
    }

    async fn atomic_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        let op_count = ops.len();
        let (collection, id) = ops
            .first()
            .map(|op| op.target())
            .map(|(c, i)| (c.to_string(), i.to_string()))
            .unwrap_or_default();
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        match self.apply_ops(&mut session, ops).await {
            Ok(()) => {
                // Only a transient label proves nothing was committed; an unknown
                // commit result is passed through untouched.
                session.commit_transaction().await.map_err(|err| {
                    if is_transient(&err) {
                        warn!(error = %err, "mongodb commit aborted by a concurrent writer");
                        StoreError::VersionConflict { collection, id }
                    } else {
                        StoreError::Mongo(err)
                    }
                })?;
                debug!(ops = op_count, "mongodb batch committed");
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(error = %abort_err, "failed to abort mongodb transaction");
                }
                Err(err)
            }
        }
    }

    async fn ensure_unique_index(&self, index: &UniqueIndex) -> StoreResult<()> {
        let mut keys = Document::new();
        for key in index.keys {
            keys.insert(*key, 1);
        }
        let options = match index.partial {
            Some((field, value)) => {
                let mut partial = Document::new();
                partial.insert(field, value);
                IndexOptions::builder()
                    .unique(true)
                    .name(index.name.to_string())
                    .partial_filter_expression(partial)
                    .build()
            }
            None => IndexOptions::builder()
                .unique(true)
                .name(index.name.to_string())
                .build(),
        };
        self.collection(index.collection)
            .create_index(IndexModel::builder().keys(keys).options(options).build())
            .await?;
        Ok(())
    }
}

fn to_mongo_filter(filters: &[Filter]) -> Document {
    if filters.is_empty() {
        return Document::new();
    }
    let clauses: Vec<Document> = filters
        .iter()
        .map(|f| {
            let condition = match f {
                Filter::Eq(_, v) => v.clone(),
                Filter::In(_, vs) => doc! { "$in": vs.clone() }.into(),
                Filter::Lt(_, v) => doc! { "$lt": v.clone() }.into(),
                Filter::Lte(_, v) => doc! { "$lte": v.clone() }.into(),
                Filter::Gt(_, v) => doc! { "$gt": v.clone() }.into(),
                Filter::Gte(_, v) => doc! { "$gte": v.clone() }.into(),
            };
            let mut clause = Document::new();
            clause.insert(f.field(), condition);
            clause
        })
        .collect();
    doc! { "$and": clauses }
}

fn map_duplicate(err: mongodb::error::Error, collection: &str, id: &str) -> StoreError {
    let duplicate = matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_err)) if write_err.code == DUPLICATE_KEY_CODE
    );
    if duplicate {
        StoreError::Duplicate {
            collection: collection.to_string(),
            key: id.to_string(),
        }
    } else {
        StoreError::Mongo(err)
    }
}

/// Write inside a transaction: duplicates as for single writes, transient
/// aborts as version conflicts.
fn map_write_error(err: mongodb::error::Error, collection: &str, id: &str) -> StoreError {
    if is_transient(&err) {
        debug!(collection, id, error = %err, "mongodb transaction write conflict");
        return StoreError::VersionConflict {
            collection: collection.to_string(),
            id: id.to_string(),
        };
    }
    map_duplicate(err, collection, id)
}

fn is_transient(err: &mongodb::error::Error) -> bool {
    if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
        return true;
    }
    match err.kind.as_ref() {
        ErrorKind::Command(command_err) => command_err.code == WRITE_CONFLICT_CODE,
        ErrorKind::Write(WriteFailure::WriteError(write_err)) => {
            write_err.code == WRITE_CONFLICT_CODE
        }
        _ => false,
    }
}
