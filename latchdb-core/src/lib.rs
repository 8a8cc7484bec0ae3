//! Typed record access over a bounded pool of document store sessions.
//!
//! This crate is the core of the latchdb project and provides:
//!
//! - **Records** ([`record`]) - The capability every stored type implements, and collection naming
//! - **Binding** ([`binding`]) - Argument shape validation and collection resolution
//! - **Store backend abstraction** ([`backend`]) - The session interface backends implement
//! - **Session pool** ([`pool`]) - A fixed set of sessions behind a counting latch
//! - **Record store** ([`store`]) - Generic insert, find, update, upsert, remove, count and aggregate
//! - **Query helpers** ([`query`]) - Filter expressions, sort keys and MongoDB document translation
//! - **Paging** ([`page`]) - Page windows and result pages
//! - **Configuration** ([`config`]) - Environment-driven store settings
//! - **Error handling** ([`error`]) - The error taxonomy shared by every crate
//!
//! # Example
//!
//! ```ignore
//! use latchdb::{Record, RecordStore};
//! use chrono::{DateTime, Utc};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Record)]
//! #[record(collection = "car", created = "created", updated = "updated")]
//! pub struct Car {
//!     pub car_id: i64,
//!     pub name: String,
//!     pub created: Option<DateTime<Utc>>,
//!     pub updated: Option<DateTime<Utc>>,
//! }
//!
//! let mut car = Car { car_id: 1, name: "civic".into(), ..Default::default() };
//! store.insert(&mut car).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as latchdb_core;

pub mod backend;
pub mod binding;
pub mod config;
pub mod error;
pub mod page;
pub mod pool;
pub mod query;
pub mod record;
pub mod stack;
pub mod store;

pub use bson;
pub use chrono;
