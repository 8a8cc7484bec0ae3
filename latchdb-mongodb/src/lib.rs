//! MongoDB backend for latchdb.
//!
//! This crate provides the production implementation of the `StoreBackend` trait on top
//! of the official async driver. Each [`MongoDbSession`] is a cheap handle over the
//! driver's connection pool; the record store bounds how many are in flight at once.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! latchdb = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Strong reads** - `Consistency::Strong` pins reads to the primary
//! - **Operation timeout** - Every driver call is bounded by the session's socket timeout
//! - **Native upserts** - `upsert_one` is a single `update_one` with `upsert: true`
//!
//! # Example
//!
//! ```ignore
//! use latchdb::{RecordStore, config::StoreConfig, mongodb::MongoDbSessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::from_env();
//!     let store = RecordStore::connect(MongoDbSessionBuilder::new(&config.address), &config).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as latchdb_mongodb;

pub mod store;

pub use store::{MongoDbSession, MongoDbSessionBuilder};
