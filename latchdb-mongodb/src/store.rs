use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Database,
    options::{ClientOptions, FindOptions, ReadPreference, SelectionCriteria},
};
use std::{fmt::Display, future::Future, time::Duration};
use tracing::{debug, error, info};

use latchdb_core::{
    backend::{
        Consistency, FindSpec, SessionOptions, StoreBackend, StoreBackendBuilder, UpdateOutcome,
        UpsertOutcome,
    },
    error::{DataAccessError, DataResult},
};

/// Database used when the connection URI names none.
pub const FALLBACK_DATABASE: &str = "test";

/// A session against one MongoDB database.
///
/// Forks share the driver's connection pool; each fork is an independent handle
/// that the record store's latch hands to one operation at a time.
#[derive(Debug, Clone)]
pub struct MongoDbSession {
    client: Client,
    database: Database,
    database_name: String,
    options: SessionOptions,
}

impl MongoDbSession {
    pub fn new(client: Client, database_name: &str, options: SessionOptions) -> Self {
        Self {
            database: client.database(database_name),
            database_name: database_name.to_string(),
            client,
            options,
        }
    }

    pub fn builder(uri: &str) -> MongoDbSessionBuilder {
        MongoDbSessionBuilder::new(uri)
    }

    /// The driver client behind this session.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The database this session works in.
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.database.collection(name)
    }

    /// Runs one driver call under the session's operation timeout.
    async fn timed<T, E, F>(&self, operation: &'static str, collection: &str, call: F) -> DataResult<T>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.options.socket_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(DataAccessError::store(operation, collection, err)),
            Err(_) => Err(DataAccessError::store(
                operation,
                collection,
                format!("timed out after {:?}", self.options.socket_timeout),
            )),
        }
    }
}

#[async_trait]
impl StoreBackend for MongoDbSession {
    fn fork(&self) -> Self {
        self.clone()
    }

    fn refresh(&mut self) {
        self.database = self.client.database(&self.database_name);
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DataResult<()> {
        self.timed("insert", collection, self.collection(collection).insert_one(document).into_future())
            .await?;

        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> DataResult<Option<Document>> {
        self.timed("find_one", collection, self.collection(collection).find_one(filter).into_future())
            .await
    }

    async fn find(&self, collection: &str, filter: Document, spec: FindSpec) -> DataResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = spec.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = spec.skip {
            options.skip = Some(skip);
        }
        if let Some(sort) = spec.sort {
            options.sort = Some(sort);
        }
        if self.options.cursor_timeout.is_none() {
            options.no_cursor_timeout = Some(true);
        }

        let target = self.collection(collection);
        self.timed("find", collection, async move {
            target
                .find(filter)
                .with_options(options)
                .await?
                .try_collect::<Vec<Document>>()
                .await
        })
        .await
    }

    async fn update_one(&self, collection: &str, selector: Document, update: Document) -> DataResult<UpdateOutcome> {
        let result = self
            .timed("update_one", collection, self.collection(collection).update_one(selector, update).into_future())
            .await?;

        Ok(UpdateOutcome { matched: result.matched_count, modified: result.modified_count })
    }

    async fn update_many(&self, collection: &str, selector: Document, update: Document) -> DataResult<UpdateOutcome> {
        let result = self
            .timed("update_all", collection, self.collection(collection).update_many(selector, update).into_future())
            .await?;

        Ok(UpdateOutcome { matched: result.matched_count, modified: result.modified_count })
    }

    async fn upsert_one(&self, collection: &str, selector: Document, update: Document) -> DataResult<UpsertOutcome> {
        let result = self
            .timed(
                "upsert_one",
                collection,
                self.collection(collection)
                    .update_one(selector, update)
                    .upsert(true)
                    .into_future(),
            )
            .await?;

        Ok(UpsertOutcome {
            matched: result.matched_count,
            inserted: result.upserted_id.is_some(),
        })
    }

    async fn delete_one(&self, collection: &str, selector: Document) -> DataResult<u64> {
        let result = self
            .timed("remove_one", collection, self.collection(collection).delete_one(selector).into_future())
            .await?;

        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, selector: Document) -> DataResult<u64> {
        let result = self
            .timed("remove_all", collection, self.collection(collection).delete_many(selector).into_future())
            .await?;

        Ok(result.deleted_count)
    }

    async fn count(&self, collection: &str, filter: Document) -> DataResult<u64> {
        self.timed("count", collection, self.collection(collection).count_documents(filter).into_future())
            .await
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> DataResult<Vec<Document>> {
        let target = self.collection(collection);

        self.timed("aggregate", collection, async move {
            target
                .aggregate(pipeline)
                .await?
                .try_collect::<Vec<Document>>()
                .await
        })
        .await
    }

    async fn shutdown(self) -> DataResult<()> {
        debug!(database = %self.database_name, "shutting down mongodb client");
        self.client.shutdown().await;

        Ok(())
    }
}

/// Maps a consistency mode onto a driver read preference.
pub fn read_preference(consistency: Consistency) -> ReadPreference {
    match consistency {
        Consistency::Strong => ReadPreference::Primary,
        Consistency::Monotonic => ReadPreference::PrimaryPreferred { options: Default::default() },
        Consistency::Eventual => ReadPreference::Nearest { options: Default::default() },
    }
}

/// Dials MongoDB and produces the base [`MongoDbSession`].
///
/// The database comes from the URI path (`mongodb://host/fleet` → `fleet`) unless
/// overridden with [`MongoDbSessionBuilder::with_database`].
#[derive(Debug, Clone)]
pub struct MongoDbSessionBuilder {
    uri: String,
    database: Option<String>,
}

impl MongoDbSessionBuilder {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: None,
        }
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbSessionBuilder {
    type Backend = MongoDbSession;

    async fn build(self, options: &SessionOptions) -> DataResult<Self::Backend> {
        let fail = |stage: &str, err: &dyn Display| {
            error!(uri = %self.uri, stage, error = %err, "mongodb dial failed");
            DataAccessError::Initialization(format!("{stage}: {err}"))
        };

        let mut client_options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|err| fail("parse uri", &err))?;

        client_options.selection_criteria = Some(SelectionCriteria::ReadPreference(read_preference(
            options.consistency,
        )));
        client_options.server_selection_timeout = Some(options.socket_timeout);
        client_options.connect_timeout = Some(options.socket_timeout.max(Duration::from_secs(1)));

        let database = self
            .database
            .clone()
            .or_else(|| client_options.default_database.clone())
            .unwrap_or_else(|| FALLBACK_DATABASE.to_string());

        let client = Client::with_options(client_options).map_err(|err| fail("create client", &err))?;

        client
            .database(&database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|err| fail("ping", &err))?;

        info!(%database, consistency = ?options.consistency, timeout = ?options.socket_timeout, "connected to mongodb");

        Ok(MongoDbSession::new(client, &database, options.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_consistency_reads_from_primary() {
        assert!(matches!(read_preference(Consistency::Strong), ReadPreference::Primary));
        assert!(matches!(
            read_preference(Consistency::Monotonic),
            ReadPreference::PrimaryPreferred { .. }
        ));
        assert!(matches!(read_preference(Consistency::Eventual), ReadPreference::Nearest { .. }));
    }

    #[tokio::test]
    async fn malformed_uri_is_an_initialization_error() {
        let err = MongoDbSessionBuilder::new("not-a-uri")
            .build(&SessionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DataAccessError::Initialization(_)));
    }
}
