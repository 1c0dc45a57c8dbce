use async_trait::async_trait;
use bson::Document;
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection,
    options::ClientOptions,
};
use docquery_core::{
    backend::{DocumentCursor, StoreBackend, StoreBackendBuilder},
    cursor::PreparedCursor,
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::query::MongoCursorTranslator;

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<()> {
        // The driver refuses empty batches.
        if documents.is_empty() {
            return Ok(());
        }

        log::debug!("inserting {} documents into '{collection}'", documents.len());

        self.get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| DocumentStoreError::Backend(e.to_string()))
    }

    async fn open_cursor(&self, cursor: PreparedCursor) -> DocumentStoreResult<DocumentCursor> {
        let (collection, filter, projection, options) = cursor.into_parts();

        Ok(
            self.get_collection(&collection)
                .find(filter)
                .with_options(MongoCursorTranslator::find_options(&options, projection))
                .await
                .map_err(|e| DocumentStoreError::Backend(e.to_string()))?
                .map_err(|e| DocumentStoreError::Backend(e.to_string()))
                .boxed()
        )
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
