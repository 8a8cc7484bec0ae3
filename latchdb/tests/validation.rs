use async_trait::async_trait;
use bson::{Document, doc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use latchdb::{
    backend::{FindSpec, UpdateOutcome, UpsertOutcome},
    prelude::*,
};

/// Fails the test on any store access.
#[derive(Debug, Clone, Default)]
struct UnreachableBackend;

#[async_trait]
impl StoreBackend for UnreachableBackend {
    fn fork(&self) -> Self {
        UnreachableBackend
    }

    fn refresh(&mut self) {
        panic!("session checked out");
    }

    async fn insert_one(&self, _: &str, _: Document) -> DataResult<()> {
        panic!("insert_one reached the store");
    }

    async fn find_one(&self, _: &str, _: Document) -> DataResult<Option<Document>> {
        panic!("find_one reached the store");
    }

    async fn find(&self, _: &str, _: Document, _: FindSpec) -> DataResult<Vec<Document>> {
        panic!("find reached the store");
    }

    async fn update_one(&self, _: &str, _: Document, _: Document) -> DataResult<UpdateOutcome> {
        panic!("update_one reached the store");
    }

    async fn update_many(&self, _: &str, _: Document, _: Document) -> DataResult<UpdateOutcome> {
        panic!("update_many reached the store");
    }

    async fn upsert_one(&self, _: &str, _: Document, _: Document) -> DataResult<UpsertOutcome> {
        panic!("upsert_one reached the store");
    }

    async fn delete_one(&self, _: &str, _: Document) -> DataResult<u64> {
        panic!("delete_one reached the store");
    }

    async fn delete_many(&self, _: &str, _: Document) -> DataResult<u64> {
        panic!("delete_many reached the store");
    }

    async fn count(&self, _: &str, _: Document) -> DataResult<u64> {
        panic!("count reached the store");
    }

    async fn aggregate(&self, _: &str, _: Vec<Document>) -> DataResult<Vec<Document>> {
        panic!("aggregate reached the store");
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Record)]
struct Car {
    name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Nameless {
    name: String,
}

impl Record for Nameless {
    fn collection_name() -> Cow<'static, str> {
        Cow::Borrowed("")
    }
}

fn store() -> RecordStore<UnreachableBackend> {
    RecordStore::new(SessionPool::from_session(UnreachableBackend, 2).unwrap())
}

fn owned() -> RecordArg<'static> {
    RecordArg::from(Box::new(Car::default()) as Box<dyn AnyRecord>)
}

#[tokio::test]
async fn records_passed_by_value_are_rejected() {
    let store = store();

    assert!(matches!(store.insert_any(owned()).await, Err(DataAccessError::NotAPointer)));
    assert!(matches!(
        store.find_one_any(owned(), doc! {}).await,
        Err(DataAccessError::NotAPointer)
    ));
    assert!(matches!(
        store.update_one_any(owned(), doc! {}, doc! { "$set": { "name": "x" } }).await,
        Err(DataAccessError::NotAPointer)
    ));
    assert!(matches!(
        store.upsert_one_any(owned(), doc! {}).await,
        Err(DataAccessError::NotAPointer)
    ));
    assert!(matches!(
        store.remove_one_any(owned(), doc! {}).await,
        Err(DataAccessError::NotAPointer)
    ));
    assert!(matches!(
        store.remove_all_any(owned(), doc! {}).await,
        Err(DataAccessError::NotAPointer)
    ));
    assert!(matches!(
        store.update_all_any(owned(), doc! {}, doc! {}).await,
        Err(DataAccessError::NotAPointer)
    ));
    assert!(matches!(store.count_any(owned(), doc! {}).await, Err(DataAccessError::NotAPointer)));
}

#[tokio::test]
async fn borrowed_boxes_are_rejected() {
    let store = store();
    let mut boxed: Box<dyn AnyRecord> = Box::new(Car::default());

    let err = store.insert_any(RecordArg::from(&mut boxed)).await.unwrap_err();
    assert!(matches!(err, DataAccessError::DoublePointer));
    assert!(err.is_validation());

    let err = store
        .find_one_any(RecordArg::from(&mut boxed), doc! {})
        .await
        .unwrap_err();
    assert!(matches!(err, DataAccessError::DoublePointer));
}

#[tokio::test]
async fn result_arguments_must_borrow_a_sequence() {
    let store = store();
    let mut single = Car::default();

    let err = store
        .find_any(ResultArg::Record(&mut single), doc! {}, Paging::default(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DataAccessError::NotASliceAddress));

    let owned: Box<dyn latchdb::record::AnyResultSet> = Box::new(Vec::<Car>::new());
    let err = store.aggregate_any(ResultArg::Owned(owned), vec![]).await.unwrap_err();
    assert!(matches!(err, DataAccessError::NotASliceAddress));
}

#[tokio::test]
async fn empty_collection_names_are_rejected() {
    let store = store();

    let err = store.insert(&mut Nameless::default()).await.unwrap_err();
    assert!(matches!(err, DataAccessError::MissingCollectionName(ref name) if name.ends_with("Nameless")));

    let mut results = Vec::<Nameless>::new();
    let err = store.find(&mut results, doc! {}, 1, 10, &[]).await.unwrap_err();
    assert!(matches!(err, DataAccessError::MissingCollectionName(_)));

    assert!(matches!(
        store.count::<Nameless>(doc! {}).await,
        Err(DataAccessError::MissingCollectionName(_))
    ));
}

#[tokio::test]
async fn rejected_calls_leave_the_pool_untouched() {
    let store = store();

    let _ = store.insert_any(owned()).await;
    let _ = store.count::<Nameless>(doc! {}).await;

    assert_eq!(store.pool().in_use(), 0);
    assert_eq!(store.pool().available(), 2);
}
