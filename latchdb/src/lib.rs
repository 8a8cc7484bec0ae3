//! Typed record access for document databases, behind a bounded session latch.
//!
//! This crate is the entry point of the latchdb project. It re-exports the core
//! types and the backends, and hosts the optional process-wide default store.
//!
//! # Features
//!
//! - **Records** - Derive [`Record`] to bind a struct to its collection and timestamps
//! - **Bounded concurrency** - A fixed number of sessions; excess callers wait
//! - **Generic operations** - Insert, find, paged find, count, update, upsert, remove, aggregate
//! - **Backends** - In-memory for tests, MongoDB for production (`mongodb` feature)
//!
//! # Quick Start
//!
//! ```ignore
//! use latchdb::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//! use chrono::{DateTime, Utc};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Record)]
//! #[record(created = "created", updated = "updated")]
//! pub struct Car {
//!     pub car_id: i64,
//!     pub name: String,
//!     pub created: Option<DateTime<Utc>>,
//!     pub updated: Option<DateTime<Utc>>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DataResult<()> {
//!     let store = RecordStore::new(SessionPool::from_session(InMemoryStore::new(), 8)?);
//!
//!     let mut car = Car { car_id: 1, name: "civic".into(), ..Default::default() };
//!     store.insert(&mut car).await?;
//!
//!     let mut cars = Vec::<Car>::new();
//!     store.find(&mut cars, doc! { "name": "civic" }, 1, 10, &["-created"]).await?;
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Default store
//!
//! With the `mongodb` feature, [`global`] holds one store for the whole process,
//! configured from the `MONGODB`, `MONGODB_CONCURRENT` and `MONGODB_TIMEOUT`
//! environment variables.
//!
//! # Backends
//!
//! - [`memory`] - In-process storage with MongoDB filter semantics
//! - [`mongodb`] - MongoDB (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as latchdb;

pub mod prelude;

#[cfg(feature = "mongodb")]
pub mod global;

pub use latchdb_core::{backend, binding, config, error, page, pool, query, record, stack, store};
pub use latchdb_core::{config::StoreConfig, store::RecordStore};
pub use latchdb_macros::Record;

pub use bson;
pub use chrono;

/// In-memory storage backend.
pub mod memory {
    pub use latchdb_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use latchdb_mongodb::{MongoDbSession, MongoDbSessionBuilder, store::read_preference};
}
