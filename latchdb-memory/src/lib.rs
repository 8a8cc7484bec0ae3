//! In-memory storage backend for latchdb.
//!
//! This crate provides a thread-safe, in-process implementation of the `StoreBackend`
//! trait. Filters, updates and pipelines use MongoDB syntax, so code written against
//! the MongoDB backend runs unchanged in tests.
//!
//! # Features
//!
//! - **Shared state** - Every forked session sees the same collections
//! - **Filters** - `$eq $ne $gt $gte $lt $lte $in $nin $exists $not $and $or $nor`, dotted paths
//! - **Updates** - `$set $unset $inc $setOnInsert` and replacement documents
//! - **Atomic upserts** - One write lock per upsert, so a key is never inserted twice
//! - **Pipelines** - `$match $sort $skip $limit $lookup $unwind $count`
//!
//! # Quick Start
//!
//! ```ignore
//! use latchdb::{RecordStore, pool::SessionPool, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RecordStore::new(SessionPool::from_session(InMemoryStore::new(), 4)?);
//!
//!     let mut car = Car { car_id: 1, name: "civic".into(), ..Default::default() };
//!     store.insert(&mut car).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as latchdb_memory;

pub mod store;
mod evaluator;
mod pipeline;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
