//! Lazy result streams over opened cursors.
//!
//! [`ResultStream`] maps raw documents to entities on demand, handing out the same
//! `Arc` for an identity seen twice in one stream. [`KeyStream`] maps them to [`Key`]s.
//! Both are single-pass; dropping either releases the driver cursor.

use bson::Document;
use futures::{Stream, StreamExt, ready};
use std::{
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    backend::DocumentCursor,
    cache::{CacheStats, EntityCache},
    entity::{Entity, ID_KEY, Key},
    error::DocumentStoreResult,
    mapper::Mapper,
};

/// Converts one raw document into an entity.
pub type Materializer<E> = fn(Document) -> DocumentStoreResult<E>;

/// A lazy stream of entities backed by a store cursor.
pub struct ResultStream<E> {
    collection: String,
    documents: DocumentCursor,
    cache: EntityCache<E>,
    materialize: Materializer<E>,
}

impl<E: Entity> ResultStream<E> {
    /// Wraps a cursor, materializing documents with [`Mapper::document_to_entity`].
    pub fn new(collection: impl Into<String>, documents: DocumentCursor) -> Self {
        Self::with_materializer(collection, documents, Mapper::document_to_entity::<E>)
    }

    /// Wraps a cursor, materializing documents with a custom conversion.
    pub fn with_materializer(
        collection: impl Into<String>,
        documents: DocumentCursor,
        materialize: Materializer<E>,
    ) -> Self {
        Self {
            collection: collection.into(),
            documents,
            cache: EntityCache::new(),
            materialize,
        }
    }

    /// Returns the usage counters of this stream's entity cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn materialize_document(&mut self, document: Document) -> DocumentStoreResult<Arc<E>> {
        let key = document
            .get(ID_KEY)
            .cloned()
            .map(|id| Key::<E>::with_collection(self.collection.clone(), id));

        if let Some(cached) = key.as_ref().and_then(|key| self.cache.get(key)) {
            return Ok(cached);
        }

        let entity = Arc::new((self.materialize)(document)?);

        Ok(match key {
            Some(key) => self.cache.insert(&key, entity),
            None => entity,
        })
    }
}

impl<E: Entity> Stream for ResultStream<E> {
    type Item = DocumentStoreResult<Arc<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        Poll::Ready(match ready!(this.documents.poll_next_unpin(cx)) {
            Some(Ok(document)) => Some(this.materialize_document(document)),
            Some(Err(err)) => Some(Err(err)),
            None => None,
        })
    }
}

impl<E> fmt::Debug for ResultStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStream")
            .field("collection", &self.collection)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// A lazy stream of entity keys backed by a store cursor.
pub struct KeyStream<E> {
    documents: DocumentCursor,
    _marker: std::marker::PhantomData<fn() -> E>,
}

impl<E: Entity> KeyStream<E> {
    pub fn new(documents: DocumentCursor) -> Self {
        Self {
            documents,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E: Entity> Stream for KeyStream<E> {
    type Item = DocumentStoreResult<Key<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        Poll::Ready(
            ready!(this.documents.poll_next_unpin(cx))
                .map(|document| document.and_then(Mapper::document_to_key::<E>)),
        )
    }
}

impl<E> fmt::Debug for KeyStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStream").finish_non_exhaustive()
    }
}
