//! In-memory storage implementation for record stores.
//!
//! This module provides an in-process backend that keeps every collection as a
//! list of BSON documents behind one async-aware read-write lock.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::trace;

use latchdb_core::{
    backend::{FindSpec, SessionOptions, StoreBackend, StoreBackendBuilder, UpdateOutcome, UpsertOutcome},
    error::{DataAccessError, DataResult},
    query::{Expr, FieldOp, parse_filter},
};

use crate::{
    evaluator::{DocumentEvaluator, sort_documents},
    pipeline::run_pipeline,
    update::{apply_update, set_path},
};

type Collections = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// Every session forked from an `InMemoryStore` shares the same collections, so a
/// pool of them behaves like a pool of connections to one database. Documents get
/// an `ObjectId` `_id` on insert when they have none, and `_id` is unique per collection.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). Intended for tests and
/// development.
///
/// # Example
///
/// ```ignore
/// use latchdb::{RecordStore, pool::SessionPool, memory::InMemoryStore};
///
/// let store = RecordStore::new(SessionPool::from_session(InMemoryStore::new(), 8)?);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    collections: Arc<RwLock<Collections>>,
    refreshes: Arc<AtomicU64>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of times any session of this store was refreshed by a pool.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Returns a copy of every document in a collection, in insertion order.
    pub async fn dump(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn position(documents: &[Document], expr: &Expr) -> DataResult<Option<usize>> {
        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::new(document).evaluate(expr)? {
                return Ok(Some(index));
            }
        }

        Ok(None)
    }

    fn matching(documents: &[Document], expr: &Expr) -> DataResult<Vec<usize>> {
        let mut indices = vec![];

        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::new(document).evaluate(expr)? {
                indices.push(index);
            }
        }

        Ok(indices)
    }
}

/// Puts `_id` first, generating one when missing.
fn with_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }

    let mut identified = Document::new();
    identified.insert("_id", ObjectId::new());
    for (key, value) in document {
        identified.insert(key, value);
    }

    identified
}

fn ensure_unique_id(collection: &str, documents: &[Document], document: &Document) -> DataResult<()> {
    let id = document.get("_id");

    if documents.iter().any(|existing| existing.get("_id") == id) {
        return Err(DataAccessError::store(
            "insert",
            collection,
            format!("duplicate key _id: {}", id.map(ToString::to_string).unwrap_or_default()),
        ));
    }

    Ok(())
}

/// Fields an upsert copies from its selector into a new document: top-level
/// equalities, including those nested in `$and`.
fn seed_from_selector(expr: &Expr, seed: &mut Document) -> DataResult<()> {
    match expr {
        Expr::Field { field, op: FieldOp::Eq, value } => set_path(seed, field, value.clone()),
        Expr::And(exprs) => exprs
            .iter()
            .try_for_each(|expr| seed_from_selector(expr, seed)),
        _ => Ok(()),
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    fn fork(&self) -> Self {
        self.clone()
    }

    fn refresh(&mut self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DataResult<()> {
        let document = with_id(document);
        let mut store = self.collections.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        ensure_unique_id(collection, documents, &document)?;
        documents.push(document);
        trace!(collection, "inserted document");

        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> DataResult<Option<Document>> {
        let expr = parse_filter(&filter)?;
        let store = self.collections.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(None);
        };

        Ok(Self::position(documents, &expr)?.map(|index| documents[index].clone()))
    }

    async fn find(&self, collection: &str, filter: Document, spec: FindSpec) -> DataResult<Vec<Document>> {
        let store = self.collections.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut matched = DocumentEvaluator::filter_documents(documents, &filter)?;
        drop(store);

        if let Some(sort) = &spec.sort {
            sort_documents(&mut matched, sort)?;
        }

        Ok(matched
            .into_iter()
            .skip(spec.skip.unwrap_or(0) as usize)
            .take(spec.limit.map(|limit| limit as usize).unwrap_or(usize::MAX))
            .collect())
    }

    async fn update_one(&self, collection: &str, selector: Document, update: Document) -> DataResult<UpdateOutcome> {
        let expr = parse_filter(&selector)?;
        let mut store = self.collections.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let Some(index) = Self::position(documents, &expr)? else {
            return Ok(UpdateOutcome::default());
        };

        let mut updated = documents[index].clone();
        let modified = apply_update(&mut updated, &update, false)?;
        documents[index] = updated;

        Ok(UpdateOutcome { matched: 1, modified: u64::from(modified) })
    }

    async fn update_many(&self, collection: &str, selector: Document, update: Document) -> DataResult<UpdateOutcome> {
        let expr = parse_filter(&selector)?;
        let mut store = self.collections.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let indices = Self::matching(documents, &expr)?;

        // Apply to copies first so a failing update leaves the collection untouched.
        let mut updated = Vec::with_capacity(indices.len());
        let mut modified = 0;
        for &index in &indices {
            let mut document = documents[index].clone();
            if apply_update(&mut document, &update, false)? {
                modified += 1;
            }
            updated.push((index, document));
        }
        for (index, document) in updated {
            documents[index] = document;
        }

        Ok(UpdateOutcome { matched: indices.len() as u64, modified })
    }

    async fn upsert_one(&self, collection: &str, selector: Document, update: Document) -> DataResult<UpsertOutcome> {
        let expr = parse_filter(&selector)?;
        let mut store = self.collections.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        if let Some(index) = Self::position(documents, &expr)? {
            let mut updated = documents[index].clone();
            apply_update(&mut updated, &update, false)?;
            documents[index] = updated;

            return Ok(UpsertOutcome { matched: 1, inserted: false });
        }

        let mut document = Document::new();
        seed_from_selector(&expr, &mut document)?;
        apply_update(&mut document, &update, true)?;
        let document = with_id(document);

        ensure_unique_id(collection, documents, &document)?;
        documents.push(document);
        trace!(collection, "upsert inserted document");

        Ok(UpsertOutcome { matched: 0, inserted: true })
    }

    async fn delete_one(&self, collection: &str, selector: Document) -> DataResult<u64> {
        let expr = parse_filter(&selector)?;
        let mut store = self.collections.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        Ok(match Self::position(documents, &expr)? {
            Some(index) => {
                documents.remove(index);
                1
            }
            None => 0,
        })
    }

    async fn delete_many(&self, collection: &str, selector: Document) -> DataResult<u64> {
        let expr = parse_filter(&selector)?;
        let mut store = self.collections.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let doomed = Self::matching(documents, &expr)?;
        let mut index = 0;
        documents.retain(|_| {
            let keep = doomed.binary_search(&index).is_err();
            index += 1;
            keep
        });

        Ok(doomed.len() as u64)
    }

    async fn count(&self, collection: &str, filter: Document) -> DataResult<u64> {
        let expr = parse_filter(&filter)?;
        let store = self.collections.read().await;

        Ok(match store.get(collection) {
            Some(documents) => Self::matching(documents, &expr)?.len() as u64,
            None => 0,
        })
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> DataResult<Vec<Document>> {
        let store = self.collections.read().await;

        run_pipeline(&store, collection, &pipeline)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// Session options are accepted and ignored: the in-memory store has no timeouts
/// and every read is consistent.
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    store: Option<InMemoryStore>,
}

impl InMemoryStoreBuilder {
    /// Builds sessions over an existing store instead of a fresh one.
    pub fn with_store(mut self, store: InMemoryStore) -> Self {
        self.store = Some(store);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self, _options: &SessionOptions) -> DataResult<Self::Backend> {
        Ok(self.store.unwrap_or_default())
    }
}
