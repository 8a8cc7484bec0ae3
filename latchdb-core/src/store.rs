//! Generic record operations over a session pool.
//!
//! [`RecordStore`] is the main entry point. Every operation binds its argument first
//! (shape check and collection lookup), then borrows one pooled session for a single
//! backend call. Validation failures return before the pool is touched.
//!
//! Each typed operation has an erased twin suffixed `_any` that takes a
//! [`RecordArg`] or [`ResultArg`], for callers that only hold `dyn AnyRecord` values.
//!
//! # Example
//!
//! ```ignore
//! use latchdb::{RecordStore, StoreConfig, mongodb::MongoDbSessionBuilder};
//! use bson::doc;
//!
//! let store = RecordStore::connect(MongoDbSessionBuilder::new(&config.address), &config).await?;
//!
//! let mut car = Car { car_id: 7, name: "civic".into(), ..Default::default() };
//! store.insert(&mut car).await?;
//!
//! let mut cars = Vec::<Car>::new();
//! store.find(&mut cars, doc! { "name": "civic" }, 1, 10, &["-created"]).await?;
//! ```

use bson::{Bson, Document, doc};
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{debug, error};

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    binding::{
        BoundRecord, BoundResults, RecordArg, ResultArg, collection_name_of, validate_record,
        validate_results,
    },
    config::StoreConfig,
    error::{DataAccessError, DataResult},
    page::{Page, Paging},
    pool::{PooledSession, SessionPool},
    query::sort_document,
    record::{AnyRecord, Record},
};

/// Typed and erased record operations sharing one [`SessionPool`].
#[derive(Debug)]
pub struct RecordStore<B: StoreBackend> {
    pool: SessionPool<B>,
}

impl<B: StoreBackend> RecordStore<B> {
    /// Wraps an existing pool.
    pub fn new(pool: SessionPool<B>) -> Self {
        Self { pool }
    }

    /// Dials the store and builds a pool sized and timed by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DataAccessError::Initialization`] when the store cannot be reached.
    pub async fn connect<T>(builder: T, config: &StoreConfig) -> DataResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        let pool = SessionPool::connect(builder, &config.session_options(), config.concurrency).await?;

        Ok(Self::new(pool))
    }

    /// The underlying session pool.
    pub fn pool(&self) -> &SessionPool<B> {
        &self.pool
    }

    /// Closes every session.
    pub async fn shutdown(self) -> DataResult<()> {
        self.pool.shutdown().await
    }

    /// Runs `op` with a raw pooled session.
    ///
    /// The escape hatch for anything the generic operations do not cover.
    pub async fn execute<'p, F, Fut, T>(&'p self, op: F) -> T
    where
        F: FnOnce(PooledSession<'p, B>) -> Fut,
        Fut: Future<Output = T>,
    {
        self.pool.with_session(op).await
    }

    /// Stamps `updated` and `created` with the current time and inserts the record.
    pub async fn insert<R: Record>(&self, record: &mut R) -> DataResult<()> {
        self.insert_any(RecordArg::from(record)).await
    }

    /// Erased form of [`RecordStore::insert`].
    pub async fn insert_any(&self, record: RecordArg<'_>) -> DataResult<()> {
        let BoundRecord { record, collection } = bind_record("insert", record)?;

        let now = Utc::now();
        record.stamp_updated(now);
        record.stamp_created(now);
        let document = record.encode()?;

        let collection = collection.as_str();
        self.pool
            .with_session(|session| async move { session.insert_one(collection, document).await })
            .await
            .inspect_err(|err| error!(operation = "insert", collection, error = %err, "record operation failed"))
    }

    /// Decodes the first document matching `query` into `record`.
    ///
    /// # Errors
    ///
    /// Returns [`DataAccessError::NoMatch`] when nothing matched. `record` is left as is.
    pub async fn find_one<R: Record>(&self, record: &mut R, query: Document) -> DataResult<()> {
        self.find_one_any(RecordArg::from(record), query).await
    }

    /// Erased form of [`RecordStore::find_one`].
    pub async fn find_one_any(&self, record: RecordArg<'_>, query: Document) -> DataResult<()> {
        let BoundRecord { record, collection } = bind_record("find_one", record)?;
        let collection = collection.as_str();

        let filter = query.clone();
        let found = self
            .pool
            .with_session(|session| async move { session.find_one(collection, filter).await })
            .await
            .and_then(|found| found.ok_or_else(|| DataAccessError::no_match(collection)))
            .inspect_err(|err| log_failure("find_one", collection, &query, err))?;

        record.load(found)
    }

    /// Stamps `updated` on `record` and applies `update` to the first match of `selector`.
    ///
    /// The record itself is not written. Only `update` reaches the store.
    ///
    /// # Errors
    ///
    /// Returns [`DataAccessError::NoMatch`] when the selector matched nothing.
    pub async fn update_one<R: Record>(
        &self,
        record: &mut R,
        selector: Document,
        update: Document,
    ) -> DataResult<()> {
        self.update_one_any(RecordArg::from(record), selector, update).await
    }

    /// Erased form of [`RecordStore::update_one`].
    pub async fn update_one_any(
        &self,
        record: RecordArg<'_>,
        selector: Document,
        update: Document,
    ) -> DataResult<()> {
        let BoundRecord { record, collection } = bind_record("update_one", record)?;
        let collection = collection.as_str();
        record.stamp_updated(Utc::now());

        let filter = selector.clone();
        let outcome = self
            .pool
            .with_session(|session| async move { session.update_one(collection, filter, update).await })
            .await
            .and_then(|outcome| match outcome.matched {
                0 => Err(DataAccessError::no_match(collection)),
                _ => Ok(outcome),
            })
            .inspect_err(|err| log_failure("update_one", collection, &selector, err))?;

        debug!(collection, modified = outcome.modified, "updated one record");

        Ok(())
    }

    /// Writes `record` over the document matching `selector`, inserting it when none exists.
    ///
    /// `updated` is always stamped. Fields set only by [`Record::set_created`] are written
    /// on insert and left untouched on update, so an existing creation time survives.
    /// When a document was inserted, `created` is stamped on `record` as well.
    pub async fn upsert_one<R: Record>(&self, record: &mut R, selector: Document) -> DataResult<()> {
        self.upsert_one_any(RecordArg::from(record), selector).await
    }

    /// Erased form of [`RecordStore::upsert_one`].
    pub async fn upsert_one_any(&self, record: RecordArg<'_>, selector: Document) -> DataResult<()> {
        let BoundRecord { record, collection } = bind_record("upsert_one", record)?;
        let collection = collection.as_str();

        let now = Utc::now();
        record.stamp_updated(now);
        let update = upsert_update(record, now)?;

        let filter = selector.clone();
        let outcome = self
            .pool
            .with_session(|session| async move { session.upsert_one(collection, filter, update).await })
            .await
            .inspect_err(|err| log_failure("upsert_one", collection, &selector, err))?;

        if outcome.inserted {
            record.stamp_created(now);
        }

        Ok(())
    }

    /// Removes the first document matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`DataAccessError::NoMatch`] when the selector matched nothing.
    pub async fn remove_one<R: Record>(&self, record: &mut R, selector: Document) -> DataResult<()> {
        self.remove_one_any(RecordArg::from(record), selector).await
    }

    /// Erased form of [`RecordStore::remove_one`].
    pub async fn remove_one_any(&self, record: RecordArg<'_>, selector: Document) -> DataResult<()> {
        let BoundRecord { collection, .. } = bind_record("remove_one", record)?;
        let collection = collection.as_str();

        let filter = selector.clone();
        self.pool
            .with_session(|session| async move { session.delete_one(collection, filter).await })
            .await
            .and_then(|removed| match removed {
                0 => Err(DataAccessError::no_match(collection)),
                _ => Ok(()),
            })
            .inspect_err(|err| log_failure("remove_one", collection, &selector, err))
    }

    /// Removes every document matching `selector` and returns how many were removed.
    pub async fn remove_all<R: Record>(&self, record: &mut R, selector: Document) -> DataResult<u64> {
        self.remove_all_any(RecordArg::from(record), selector).await
    }

    /// Erased form of [`RecordStore::remove_all`].
    pub async fn remove_all_any(&self, record: RecordArg<'_>, selector: Document) -> DataResult<u64> {
        let BoundRecord { collection, .. } = bind_record("remove_all", record)?;
        let collection = collection.as_str();

        let filter = selector.clone();
        self.pool
            .with_session(|session| async move { session.delete_many(collection, filter).await })
            .await
            .inspect_err(|err| log_failure("remove_all", collection, &selector, err))
    }

    /// Replaces the contents of `results` with the matches of `query`.
    ///
    /// `page` is 1-based. `page < 0 && page_size < 0` returns every match. Otherwise
    /// `(page - 1) * page_size` matches are skipped (never fewer than zero) and at most
    /// `page_size` are returned when it is positive. Sort keys are field names, prefixed
    /// with `-` for descending order.
    pub async fn find<R: Record>(
        &self,
        results: &mut Vec<R>,
        query: Document,
        page: i64,
        page_size: i64,
        sorts: &[&str],
    ) -> DataResult<()> {
        self.find_any(ResultArg::from(results), query, Paging::new(page, page_size), sorts)
            .await
    }

    /// Erased form of [`RecordStore::find`].
    pub async fn find_any(
        &self,
        results: ResultArg<'_>,
        query: Document,
        paging: Paging,
        sorts: &[&str],
    ) -> DataResult<()> {
        let BoundResults { results, collection } = bind_results("find", results)?;
        let collection = collection.as_str();

        let filter = query.clone();
        let spec = paging.find_spec(sort_document(sorts));
        let documents = self
            .pool
            .with_session(|session| async move { session.find(collection, filter, spec).await })
            .await
            .inspect_err(|err| log_failure("find", collection, &query, err))?;

        results.clear_records();
        for document in documents {
            results.push_document(document)?;
        }

        Ok(())
    }

    /// Fetches one page of matches together with the total match count.
    pub async fn find_page<R: Record>(
        &self,
        query: Document,
        paging: Paging,
        sorts: &[&str],
    ) -> DataResult<Page<R>> {
        let mut items = Vec::new();
        self.find_any(ResultArg::from(&mut items), query.clone(), paging, sorts)
            .await?;
        let count = self.count::<R>(query).await?;

        Ok(Page::from_window(items, count, paging))
    }

    /// Counts the documents of `R`'s collection matching `query`.
    pub async fn count<R: Record>(&self, query: Document) -> DataResult<u64> {
        let collection = collection_name_of::<R>()
            .inspect_err(|err| error!(operation = "count", error = %err, "invalid record argument"))?;

        self.count_in(&collection, query).await
    }

    /// Erased form of [`RecordStore::count`].
    pub async fn count_any(&self, record: RecordArg<'_>, query: Document) -> DataResult<u64> {
        let BoundRecord { collection, .. } = bind_record("count", record)?;
        let collection = collection.as_str();

        self.count_in(collection, query).await
    }

    /// Stamps `updated` on `record`, applies `update` to every match of `selector` and
    /// returns the number of documents modified.
    pub async fn update_all<R: Record>(
        &self,
        record: &mut R,
        selector: Document,
        update: Document,
    ) -> DataResult<u64> {
        self.update_all_any(RecordArg::from(record), selector, update).await
    }

    /// Erased form of [`RecordStore::update_all`].
    pub async fn update_all_any(
        &self,
        record: RecordArg<'_>,
        selector: Document,
        update: Document,
    ) -> DataResult<u64> {
        let BoundRecord { record, collection } = bind_record("update_all", record)?;
        let collection = collection.as_str();
        record.stamp_updated(Utc::now());

        let filter = selector.clone();
        self.pool
            .with_session(|session| async move { session.update_many(collection, filter, update).await })
            .await
            .map(|outcome| outcome.modified)
            .inspect_err(|err| log_failure("update_all", collection, &selector, err))
    }

    /// Runs `pipeline` on the collection of `R` and decodes the output into `results`.
    pub async fn aggregate<R: Record>(
        &self,
        results: &mut Vec<R>,
        pipeline: Vec<Document>,
    ) -> DataResult<()> {
        self.aggregate_any(ResultArg::from(results), pipeline).await
    }

    /// Erased form of [`RecordStore::aggregate`].
    pub async fn aggregate_any(
        &self,
        results: ResultArg<'_>,
        pipeline: Vec<Document>,
    ) -> DataResult<()> {
        let BoundResults { results, collection } = bind_results("aggregate", results)?;
        let collection = collection.as_str();

        let stages = pipeline.len();
        let documents = self
            .pool
            .with_session(|session| async move { session.aggregate(collection, pipeline).await })
            .await
            .inspect_err(|err| error!(operation = "aggregate", collection, stages, error = %err, "record operation failed"))?;

        results.clear_records();
        for document in documents {
            results.push_document(document)?;
        }

        Ok(())
    }

    async fn count_in(&self, collection: &str, query: Document) -> DataResult<u64> {
        let filter = query.clone();

        self.pool
            .with_session(|session| async move { session.count(collection, filter).await })
            .await
            .inspect_err(|err| log_failure("count", collection, &query, err))
    }
}

fn bind_record<'a>(operation: &'static str, record: RecordArg<'a>) -> DataResult<BoundRecord<'a>> {
    validate_record(record)
        .inspect_err(|err| error!(operation, error = %err, "invalid record argument"))
}

fn bind_results<'a>(operation: &'static str, results: ResultArg<'a>) -> DataResult<BoundResults<'a>> {
    validate_results(results)
        .inspect_err(|err| error!(operation, error = %err, "invalid result argument"))
}

fn log_failure(operation: &'static str, collection: &str, filter: &Document, err: &DataAccessError) {
    if err.is_no_match() {
        debug!(operation, collection, filter = %filter, "no document matched");
    } else {
        error!(operation, collection, filter = %filter, error = %err, "record operation failed");
    }
}

/// Builds the upsert update for a record whose `updated` stamp is already set.
///
/// Fields that [`AnyRecord::stamp_created`] changes on a copy of the record go to
/// `$setOnInsert`, along with `_id`. Everything else goes to `$set`.
fn upsert_update(record: &dyn AnyRecord, now: DateTime<Utc>) -> DataResult<Document> {
    let mut fields = record.encode()?;

    let mut probe = record.duplicate()?;
    let baseline = probe.encode()?;
    probe.stamp_created(now);
    let stamped = probe.encode()?;

    let mut on_insert = stamped
        .into_iter()
        .filter(|(key, value)| baseline.get(key) != Some(value))
        .collect::<Document>();

    for key in on_insert.keys() {
        fields.remove(key);
    }
    if let Some(id) = fields.remove("_id") {
        on_insert.insert("_id", id);
    }

    let mut update = doc! { "$set": fields };
    if !on_insert.is_empty() {
        update.insert("$setOnInsert", Bson::Document(on_insert));
    }

    Ok(update)
}
