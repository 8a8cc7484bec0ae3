//! Convenient re-exports of commonly used types from latchdb.
//!
//! ```ignore
//! use latchdb::prelude::*;
//! ```
//!
//! This brings in the record trait and its derive, the record store and its pool,
//! the backend traits, query helpers, paging and the error types.

pub use latchdb_core::{
    backend::{Consistency, SessionOptions, StoreBackend, StoreBackendBuilder},
    binding::{RecordArg, ResultArg},
    config::StoreConfig,
    error::{DataAccessError, DataResult},
    page::{Page, Paging},
    pool::{PooledSession, SessionPool},
    query::{Expr, FieldOp, Filter, QueryVisitor, Sort, SortDirection, to_document},
    record::{AnyRecord, Record, RecordExt},
    store::RecordStore,
};
pub use latchdb_macros::Record;
