//! Storage backend abstraction for the record store.
//!
//! This module defines the session-level interface every backing store exposes to the
//! pool. A backend value *is* a session: it can be forked into independent sessions,
//! refreshed before reuse, and used to run one primitive operation at a time against a
//! named collection.
//!
//! # Traits
//!
//! - [`StoreBackend`]: A live session and its primitive operations
//! - [`StoreBackendBuilder`]: Dials the store and produces the base session
//!
//! # Examples
//!
//! ```ignore
//! use latchdb::backend::{StoreBackend, StoreBackendBuilder, SessionOptions};
//! use bson::doc;
//!
//! let session = MyBackendBuilder::new("...").build(&SessionOptions::default()).await?;
//! session.insert_one("car", doc! { "carId": 1, "name": "civic" }).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::{fmt::Debug, time::Duration};

use crate::error::DataResult;

/// Read consistency requested from the store when the base session is dialed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Every read goes to the primary, so a session always reads its own writes.
    #[default]
    Strong,
    /// Reads may go to a secondary once the session has read from it.
    Monotonic,
    /// Reads may go to any member.
    Eventual,
}

/// Settings applied to the base session before it is forked into the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Read consistency mode.
    pub consistency: Consistency,
    /// Upper bound for a single store operation.
    pub socket_timeout: Duration,
    /// Idle timeout for server-side cursors. `None` disables it.
    pub cursor_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            consistency: Consistency::Strong,
            socket_timeout: Duration::from_secs(3),
            cursor_timeout: None,
        }
    }
}

/// Skip, limit and sort applied to a find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Sort document in MongoDB syntax (`{ "field": 1 | -1 }`).
    pub sort: Option<Document>,
}

/// Outcome of an update against one or many documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents matched by the selector.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
}

/// Outcome of an atomic upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Documents matched by the selector (0 or 1).
    pub matched: u64,
    /// `true` when no document matched and a new one was inserted.
    pub inserted: bool,
}

/// A live session against a backing document store.
///
/// Sessions are owned exclusively by one in-flight operation at a time; the pool
/// guarantees it. Implementations must still be `Send + Sync` so pools can be shared
/// across tasks.
///
/// # Error Handling
///
/// Store-side failures are reported as
/// [`DataAccessError::StoreOperationFailed`](crate::error::DataAccessError::StoreOperationFailed).
/// "Nothing matched" is not an error at this level: it is visible in the returned
/// counts and options, and the record store turns it into `NoMatch` where required.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug + Sized + 'static {
    /// Creates an independent session sharing the same underlying connection settings.
    fn fork(&self) -> Self;

    /// Clears stale per-session state before the session is handed out again.
    fn refresh(&mut self) {}

    /// Inserts a new document into a collection.
    async fn insert_one(&self, collection: &str, document: Document) -> DataResult<()>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(&self, collection: &str, filter: Document) -> DataResult<Option<Document>>;

    /// Returns every document matching `filter`, sorted, skipped and limited per `spec`.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> DataResult<Vec<Document>>;

    /// Applies `update` to the first document matching `selector`.
    async fn update_one(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
    ) -> DataResult<UpdateOutcome>;

    /// Applies `update` to every document matching `selector`.
    async fn update_many(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
    ) -> DataResult<UpdateOutcome>;

    /// Applies `update` to the first document matching `selector`, or inserts a new
    /// document built from the selector's equality fields and `update` when nothing
    /// matches. Must be atomic with respect to other upserts on the same key.
    async fn upsert_one(
        &self,
        collection: &str,
        selector: Document,
        update: Document,
    ) -> DataResult<UpsertOutcome>;

    /// Removes the first document matching `selector` and returns how many were removed.
    async fn delete_one(&self, collection: &str, selector: Document) -> DataResult<u64>;

    /// Removes every document matching `selector` and returns how many were removed.
    async fn delete_many(&self, collection: &str, selector: Document) -> DataResult<u64>;

    /// Counts the documents matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> DataResult<u64>;

    /// Runs an aggregation pipeline against a collection.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> DataResult<Vec<Document>>;

    /// Cleanly shuts the session down, releasing its resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DataResult<()> {
        Ok(())
    }
}

/// Dials a backing store and returns the base session the pool forks from.
#[async_trait]
pub trait StoreBackendBuilder: Send {
    type Backend: StoreBackend;

    /// Connects and applies `options` to the base session.
    ///
    /// # Errors
    ///
    /// Returns [`DataAccessError::Initialization`](crate::error::DataAccessError::Initialization)
    /// when the store cannot be reached.
    async fn build(self, options: &SessionOptions) -> DataResult<Self::Backend>;
}
