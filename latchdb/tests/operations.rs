use bson::doc;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use latchdb::{
    memory::InMemoryStore,
    prelude::*,
};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, Record)]
#[record(collection = "car", created = "created", updated = "updated")]
#[serde(rename_all = "camelCase")]
struct Car {
    car_id: i64,
    name: String,
    #[serde(default)]
    price: i64,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, Record)]
#[serde(rename_all = "camelCase")]
struct CarOwner {
    owner_id: i64,
    car_id: i64,
    #[serde(default)]
    cars: Vec<Car>,
}

fn car(car_id: i64, name: &str) -> Car {
    Car { car_id, name: name.to_string(), ..Default::default() }
}

fn open(backend: InMemoryStore) -> RecordStore<InMemoryStore> {
    RecordStore::new(SessionPool::from_session(backend, 4).unwrap())
}

async fn seeded(count: i64) -> RecordStore<InMemoryStore> {
    let store = open(InMemoryStore::new());
    for car_id in 1..=count {
        store.insert(&mut car(car_id, "fleet")).await.unwrap();
    }
    store
}

fn near_now(at: Option<DateTime<Utc>>) -> bool {
    at.is_some_and(|at| (Utc::now() - at).abs() < Duration::seconds(5))
}

#[tokio::test]
async fn insert_then_find_one_returns_the_record() {
    let store = open(InMemoryStore::new());

    let mut inserted = car(1, "civic");
    store.insert(&mut inserted).await.unwrap();
    assert!(near_now(inserted.created));
    assert!(near_now(inserted.updated));

    let mut found = Car::default();
    store.find_one(&mut found, doc! { "carId": 1_i64 }).await.unwrap();

    assert_eq!(found, inserted);
}

#[tokio::test]
async fn find_one_without_a_match_leaves_the_record_alone() {
    let store = open(InMemoryStore::new());

    let mut found = car(9, "untouched");
    let err = store.find_one(&mut found, doc! { "carId": 1_i64 }).await.unwrap_err();

    assert!(err.is_no_match());
    assert_eq!(found.name, "untouched");
}

#[tokio::test]
async fn update_one_on_a_missing_selector_is_no_match() {
    let store = seeded(1).await;

    let err = store
        .update_one(&mut Car::default(), doc! { "carId": 42_i64 }, doc! { "$set": { "name": "BMW" } })
        .await
        .unwrap_err();

    assert!(matches!(err, DataAccessError::NoMatch { ref collection } if collection == "car"));
}

#[tokio::test]
async fn update_one_writes_only_the_update_document() {
    let store = seeded(1).await;

    let mut local = car(1, "ignored");
    store
        .update_one(&mut local, doc! { "carId": 1_i64 }, doc! { "$set": { "name": "BMW" } })
        .await
        .unwrap();
    assert!(near_now(local.updated));

    let mut stored = Car::default();
    store.find_one(&mut stored, doc! { "carId": 1_i64 }).await.unwrap();
    assert_eq!(stored.name, "BMW");
}

#[tokio::test]
async fn upsert_twice_leaves_one_document_with_the_latest_values() {
    let backend = InMemoryStore::new();
    let store = open(backend.clone());

    let mut first = Car { price: 100, ..car(7, "civic") };
    store.upsert_one(&mut first, doc! { "carId": 7_i64 }).await.unwrap();
    let created = first.created;
    assert!(near_now(created));

    let mut second = Car { price: 200, ..car(7, "civic") };
    store.upsert_one(&mut second, doc! { "carId": 7_i64 }).await.unwrap();
    assert_eq!(second.created, None);

    let documents = backend.dump("car").await;
    assert_eq!(documents.len(), 1);

    let mut stored = Car::default();
    store.find_one(&mut stored, doc! { "carId": 7_i64 }).await.unwrap();
    assert_eq!(stored.price, 200);
    assert_eq!(stored.created, created);
}

#[tokio::test]
async fn find_pages_are_bounded_and_disjoint() {
    let store = seeded(25).await;

    let mut first = Vec::<Car>::new();
    let mut second = Vec::<Car>::new();
    store.find(&mut first, doc! {}, 1, 10, &["carId"]).await.unwrap();
    store.find(&mut second, doc! {}, 2, 10, &["carId"]).await.unwrap();

    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 10);
    assert!(first.iter().all(|a| second.iter().all(|b| a.car_id != b.car_id)));
    assert_eq!(second[0].car_id, 11);
}

#[tokio::test]
async fn negative_page_and_size_return_every_match() {
    let store = seeded(25).await;

    let mut all = vec![car(99, "stale")];
    store.find(&mut all, doc! { "name": "fleet" }, -1, -1, &["-carId"]).await.unwrap();

    assert_eq!(all.len(), 25);
    assert_eq!(all[0].car_id, 25);
}

#[tokio::test]
async fn find_page_reports_count_and_neighbours() {
    let store = seeded(25).await;

    let page = store
        .find_page::<Car>(doc! {}, Paging::new(2, 10), &["carId"])
        .await
        .unwrap();

    assert_eq!(page.items.len(), 10);
    assert_eq!(page.count, 25);
    assert_eq!(page.previous_page, Some(1));
    assert_eq!(page.next_page, Some(3));
}

#[tokio::test]
async fn count_update_all_and_remove_all() {
    let store = seeded(5).await;

    assert_eq!(store.count::<Car>(doc! { "carId": { "$gt": 2_i64 } }).await.unwrap(), 3);

    let modified = store
        .update_all(&mut Car::default(), doc! { "carId": { "$lte": 2_i64 } }, doc! { "$set": { "name": "sold" } })
        .await
        .unwrap();
    assert_eq!(modified, 2);
    assert_eq!(store.count::<Car>(doc! { "name": "sold" }).await.unwrap(), 2);

    let removed = store.remove_all(&mut Car::default(), doc! { "name": "sold" }).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.count::<Car>(doc! {}).await.unwrap(), 3);
}

#[tokio::test]
async fn remove_one_reports_missing_documents() {
    let store = seeded(2).await;

    store.remove_one(&mut Car::default(), doc! { "carId": 1_i64 }).await.unwrap();
    let err = store
        .remove_one(&mut Car::default(), doc! { "carId": 1_i64 })
        .await
        .unwrap_err();

    assert!(err.is_no_match());
    assert_eq!(store.count::<Car>(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn aggregate_joins_across_collections() {
    let store = seeded(2).await;
    store.insert(&mut CarOwner { owner_id: 10, car_id: 2, cars: vec![] }).await.unwrap();

    let mut owners = Vec::<CarOwner>::new();
    store
        .aggregate(
            &mut owners,
            vec![
                doc! { "$match": { "ownerId": 10_i64 } },
                doc! { "$lookup": { "from": "car", "localField": "carId", "foreignField": "carId", "as": "cars" } },
            ],
        )
        .await
        .unwrap();

    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].cars.len(), 1);
    assert_eq!(owners[0].cars[0].car_id, 2);
}

#[tokio::test]
async fn execute_hands_out_a_refreshed_session() {
    let backend = InMemoryStore::new();
    let store = open(backend.clone());

    let count = store
        .execute(|session| async move { session.count("car", doc! {}).await })
        .await
        .unwrap();

    assert_eq!(count, 0);
    assert_eq!(backend.refresh_count(), 1);
    assert_eq!(store.pool().in_use(), 0);
}

#[tokio::test]
async fn filters_built_from_expressions_run_on_the_memory_backend() {
    let store = seeded(6).await;

    let filter = to_document(&Filter::and([
        Filter::gte("carId", 2_i64),
        Filter::none_of("carId", [3_i64, 4]),
    ]))
    .unwrap();

    let mut cars = Vec::<Car>::new();
    store.find(&mut cars, filter, -1, -1, &["carId"]).await.unwrap();

    assert_eq!(cars.iter().map(|car| car.car_id).collect::<Vec<_>>(), vec![2, 5, 6]);
}
