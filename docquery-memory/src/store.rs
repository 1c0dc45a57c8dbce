//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that keeps every collection as an
//! insertion-ordered list of BSON documents behind an async-safe read-write lock.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use docquery_core::{
    backend::{DocumentCursor, StoreBackend, StoreBackendBuilder},
    cursor::PreparedCursor,
    entity::ID_KEY,
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::evaluator::{DocumentEvaluator, compare_documents, project};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// Documents are kept in insertion order, which is the natural order of unsorted
/// queries. Cursors are evaluated eagerly when opened and then streamed.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing), so index hints are
/// ignored. Snapshot mode and batch sizes have no effect either.
///
/// # Example
///
/// ```ignore
/// use docquery_memory::InMemoryStore;
/// use docquery::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.insert_documents("users", vec![doc! { "name": "Alice", "age": 30 }]).await?;
///     assert_eq!(store.count_documents("users", doc! { "age": { "$gt": 18 } }).await?, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docquery_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    async fn matching(&self, collection: &str, filter: &Document) -> DocumentStoreResult<Vec<Document>> {
        let documents = match self.store.read().await.get(collection) {
            Some(documents) => documents.clone(),
            None => return Ok(vec![]),
        };

        DocumentEvaluator::filter_documents(documents, filter)
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let stored = store
            .entry(collection.to_string())
            .or_default();

        let mut incoming: Vec<Document> = Vec::with_capacity(documents.len());
        for document in documents {
            let document = with_identity(document);
            let id = document.get(ID_KEY).cloned().unwrap_or(Bson::Null);

            if stored
                .iter()
                .chain(incoming.iter())
                .any(|existing| existing.get(ID_KEY) == Some(&id))
            {
                return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
            }

            incoming.push(document);
        }

        log::debug!("inserting {} documents into '{collection}'", incoming.len());
        stored.extend(incoming);

        Ok(())
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(self.matching(collection, &filter).await?.len() as u64)
    }

    async fn open_cursor(&self, cursor: PreparedCursor) -> DocumentStoreResult<DocumentCursor> {
        let (collection, filter, projection, options) = cursor.into_parts();
        let mut documents = self.matching(&collection, &filter).await?;

        if let Some(sort) = &options.sort {
            documents.sort_by(|left, right| compare_documents(left, right, sort));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options
            .limit
            .filter(|limit| *limit != 0)
            .map_or(usize::MAX, |limit| limit.unsigned_abs() as usize);

        let results: Vec<DocumentStoreResult<Document>> = documents
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &projection {
                Some(projection) => project(document, projection),
                None => document,
            })
            .map(Ok)
            .collect();

        Ok(stream::iter(results).boxed())
    }
}

/// Puts a generated `_id` in front of documents that lack one.
fn with_identity(document: Document) -> Document {
    if document.contains_key(ID_KEY) {
        return document;
    }

    let mut identified = Document::new();
    identified.insert(ID_KEY, ObjectId::new());
    for (key, value) in document {
        identified.insert(key, value);
    }

    identified
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docquery_memory::InMemoryStore;
/// use docquery::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use futures::TryStreamExt;

    use super::*;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::builder().build().await.unwrap();
        store
            .insert_documents(
                "hotels",
                vec![
                    doc! { "_id": "ritz", "name": "Ritz", "stars": 5 },
                    doc! { "_id": "savoy", "name": "Savoy", "stars": 5 },
                    doc! { "_id": "ibis", "name": "Ibis", "stars": 2 },
                ],
            )
            .await
            .unwrap();
        store
    }

    async fn run(store: &InMemoryStore, cursor: PreparedCursor) -> Vec<Document> {
        store.open_cursor(cursor).await.unwrap().try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn generates_missing_identities() {
        let store = InMemoryStore::new();
        store.insert_documents("hotels", vec![doc! { "name": "Adlon" }]).await.unwrap();

        let documents = run(&store, PreparedCursor::find("hotels", doc! {}, None)).await;
        assert!(matches!(documents[0].get(ID_KEY), Some(Bson::ObjectId(_))));
        assert_eq!(documents[0].keys().next().map(String::as_str), Some(ID_KEY));
    }

    #[tokio::test]
    async fn rejects_duplicate_identities() {
        let store = seeded().await;

        let err = store
            .insert_documents("hotels", vec![doc! { "_id": "plaza" }, doc! { "_id": "ritz" }])
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::DocumentAlreadyExists(_, _)));
        assert_eq!(store.count_documents("hotels", doc! {}).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn counts_matching_documents() {
        let store = seeded().await;

        assert_eq!(store.count_documents("hotels", doc! { "stars": 5 }).await.unwrap(), 2);
        assert_eq!(store.count_documents("rooms", doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn applies_sort_skip_limit_and_projection() {
        let store = seeded().await;
        let mut cursor = PreparedCursor::find("hotels", doc! {}, Some(doc! { "name": true }));
        cursor.sort(doc! { "stars": 1, "name": -1 }).skip(1).limit(1);

        assert_eq!(run(&store, cursor).await, vec![doc! { "_id": "savoy", "name": "Savoy" }]);
    }

    #[tokio::test]
    async fn sorts_collections_containing_nan() {
        let store = InMemoryStore::new();
        let documents = (0..40)
            .map(|i| match i % 3 {
                0 => doc! { "_id": i, "v": f64::NAN },
                _ => doc! { "_id": i, "v": 40 - i },
            })
            .collect();
        store.insert_documents("readings", documents).await.unwrap();

        let mut cursor = PreparedCursor::find("readings", doc! {}, None);
        cursor.sort(doc! { "v": 1 });
        let sorted = run(&store, cursor).await;

        assert_eq!(sorted.len(), 40);
        let (nan, numbers) = sorted.split_at(14);
        assert!(nan.iter().all(|d| d.get_f64("v").is_ok_and(f64::is_nan)));
        let values: Vec<i32> = numbers.iter().map(|d| d.get_i32("v").unwrap()).collect();
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn keeps_insertion_order_without_sort() {
        let store = seeded().await;
        let documents = run(&store, PreparedCursor::find("hotels", doc! { "stars": { "$gte": 2 } }, None)).await;

        let ids: Vec<_> = documents.iter().map(|d| d.get_str("_id").unwrap()).collect();
        assert_eq!(ids, vec!["ritz", "savoy", "ibis"]);
    }

    #[tokio::test]
    async fn unsupported_filters_fail() {
        let store = seeded().await;
        let result = store
            .open_cursor(PreparedCursor::find("hotels", doc! { "$where": "true" }, None))
            .await;

        assert!(matches!(result, Err(DocumentStoreError::Backend(_))));
    }
}
