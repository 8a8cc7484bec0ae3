//! Walks through every record operation against the in-memory backend.
//!
//! ```sh
//! RUST_LOG=latchdb=debug cargo run -p latchdb --example crud
//! ```

use bson::doc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use latchdb::{memory::InMemoryStore, prelude::*};

#[derive(Debug, Default, Clone, Serialize, Deserialize, Record)]
#[record(collection = "car", created = "created", updated = "updated")]
#[serde(rename_all = "camelCase")]
struct Car {
    car_id: i64,
    name: String,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> DataResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = StoreConfig::from_env().with_concurrency(8);
    let store = RecordStore::connect(InMemoryStore::builder(), &config).await?;

    for (car_id, name) in [(1, "civic"), (2, "accord"), (3, "corolla")] {
        store.insert(&mut Car { car_id, name: name.into(), ..Default::default() }).await?;
    }

    let mut car = Car::default();
    store.find_one(&mut car, doc! { "carId": 1_i64 }).await?;
    println!("found {car:?}");

    store
        .update_one(&mut car, doc! { "carId": 1_i64 }, doc! { "$set": { "name": "BMW" } })
        .await?;

    let mut upserted = Car { car_id: 4, name: "model 3".into(), ..Default::default() };
    store.upsert_one(&mut upserted, doc! { "carId": 4_i64 }).await?;

    let page = store
        .find_page::<Car>(doc! {}, Paging::new(1, 2), &["-carId"])
        .await?;
    println!(
        "page 1: {:?} of {} (next {:?})",
        page.items.iter().map(|car| &car.name).collect::<Vec<_>>(),
        page.count,
        page.next_page
    );

    if let Err(err) = store
        .remove_one(&mut Car::default(), doc! { "carId": 42_i64 })
        .await
    {
        println!("expected: {err}");
    }

    let removed = store.remove_all(&mut Car::default(), doc! {}).await?;
    println!("removed {removed} cars, {} left", store.count::<Car>(doc! {}).await?);

    store.shutdown().await
}
