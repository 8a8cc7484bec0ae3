//! The process-wide default store.
//!
//! Services that want one store for their whole lifetime call [`init`] (or
//! [`init_from_env`]) once at startup, then use the free functions here from anywhere.
//! Every free function returns [`DataAccessError::Uninitialized`] until then.
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() {
//!     latchdb::global::init_from_env().await;
//!
//!     let mut car = Car { car_id: 1, ..Default::default() };
//!     latchdb::global::insert(&mut car).await?;
//! }
//! ```

use bson::Document;
use std::{future::Future, sync::OnceLock};
use tracing::{error, info, warn};

use latchdb_core::{
    config::StoreConfig,
    error::{DataAccessError, DataResult},
    page::{Page, Paging},
    pool::PooledSession,
    record::Record,
    store::RecordStore,
};
use latchdb_mongodb::{MongoDbSession, MongoDbSessionBuilder};

static STORE: OnceLock<RecordStore<MongoDbSession>> = OnceLock::new();

/// Connects the default store.
///
/// A second call returns the store from the first one and ignores `config`.
///
/// # Errors
///
/// Returns [`DataAccessError::Initialization`] when MongoDB cannot be reached.
pub async fn try_init(config: &StoreConfig) -> DataResult<&'static RecordStore<MongoDbSession>> {
    if let Some(store) = STORE.get() {
        warn!("default store already initialized");
        return Ok(store);
    }

    let store = RecordStore::connect(MongoDbSessionBuilder::new(&config.address), config).await?;
    info!(concurrency = config.concurrency, timeout = ?config.timeout, "default store ready");

    Ok(STORE.get_or_init(|| store))
}

/// Connects the default store, terminating the process when MongoDB cannot be reached.
pub async fn init(config: &StoreConfig) -> &'static RecordStore<MongoDbSession> {
    match try_init(config).await {
        Ok(store) => store,
        Err(err) => {
            error!(address = %config.address, error = %err, "cannot connect the default store");
            std::process::exit(1);
        }
    }
}

/// [`init`] with the configuration read from the environment.
pub async fn init_from_env() -> &'static RecordStore<MongoDbSession> {
    init(&StoreConfig::from_env()).await
}

pub fn is_initialized() -> bool {
    STORE.get().is_some()
}

/// The default store.
pub fn store() -> DataResult<&'static RecordStore<MongoDbSession>> {
    STORE.get().ok_or(DataAccessError::Uninitialized)
}

pub async fn execute<F, Fut, T>(op: F) -> DataResult<T>
where
    F: FnOnce(PooledSession<'static, MongoDbSession>) -> Fut,
    Fut: Future<Output = T>,
{
    Ok(store()?.execute(op).await)
}

pub async fn insert<R: Record>(record: &mut R) -> DataResult<()> {
    store()?.insert(record).await
}

pub async fn find_one<R: Record>(record: &mut R, query: Document) -> DataResult<()> {
    store()?.find_one(record, query).await
}

pub async fn update_one<R: Record>(record: &mut R, selector: Document, update: Document) -> DataResult<()> {
    store()?.update_one(record, selector, update).await
}

pub async fn upsert_one<R: Record>(record: &mut R, selector: Document) -> DataResult<()> {
    store()?.upsert_one(record, selector).await
}

pub async fn remove_one<R: Record>(record: &mut R, selector: Document) -> DataResult<()> {
    store()?.remove_one(record, selector).await
}

pub async fn remove_all<R: Record>(record: &mut R, selector: Document) -> DataResult<u64> {
    store()?.remove_all(record, selector).await
}

pub async fn find<R: Record>(
    results: &mut Vec<R>,
    query: Document,
    page: i64,
    page_size: i64,
    sorts: &[&str],
) -> DataResult<()> {
    store()?.find(results, query, page, page_size, sorts).await
}

pub async fn find_page<R: Record>(query: Document, paging: Paging, sorts: &[&str]) -> DataResult<Page<R>> {
    store()?.find_page(query, paging, sorts).await
}

pub async fn count<R: Record>(query: Document) -> DataResult<u64> {
    store()?.count::<R>(query).await
}

pub async fn update_all<R: Record>(record: &mut R, selector: Document, update: Document) -> DataResult<u64> {
    store()?.update_all(record, selector, update).await
}

pub async fn aggregate<R: Record>(results: &mut Vec<R>, pipeline: Vec<Document>) -> DataResult<()> {
    store()?.aggregate(results, pipeline).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
    struct Car {
        name: String,
    }

    impl Record for Car {}

    #[tokio::test]
    async fn operations_fail_before_init() {
        assert!(!is_initialized());
        assert!(matches!(store(), Err(DataAccessError::Uninitialized)));

        let mut car = Car::default();
        assert!(matches!(insert(&mut car).await, Err(DataAccessError::Uninitialized)));
        assert!(matches!(count::<Car>(doc! {}).await, Err(DataAccessError::Uninitialized)));

        let mut cars = Vec::<Car>::new();
        assert!(matches!(
            find(&mut cars, doc! {}, -1, -1, &[]).await,
            Err(DataAccessError::Uninitialized)
        ));
    }
}
