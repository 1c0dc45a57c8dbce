//! Main document store interface.
//!
//! [`DocumentStore`] binds a backend and hands out [`Query`] builders for entity types.
//!
//! # Example
//!
//! ```ignore
//! use docquery::store::DocumentStore;
//!
//! let store = DocumentStore::new(backend);
//! store.insert(&[hotel]).await?;
//!
//! let mut query = store.query::<Hotel>();
//! query.filter("name", "Ritz")?;
//! let ritz = query.get().await?;
//! ```

use bson::Document;

use crate::{
    backend::StoreBackend,
    entity::Entity,
    error::DocumentStoreResult,
    mapper::Mapper,
    query::Query,
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates an empty query over the collection of `E`.
    pub fn query<E: Entity>(&self) -> Query<'_, E> {
        Query::new(&self.backend)
    }

    /// Creates a query over the collection of `E` starting from a base filter.
    ///
    /// Criteria added to the query are merged over `base`, replacing keys they share.
    pub fn query_with<E: Entity>(&self, base: Document) -> Query<'_, E> {
        Query::with_base(&self.backend, base)
    }

    /// Serializes and inserts entities into their collection.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the backend rejects a document (for
    /// example because its `_id` already exists).
    pub async fn insert<E: Entity>(&self, entities: &[E]) -> DocumentStoreResult<()> {
        let documents = entities
            .iter()
            .map(Mapper::entity_to_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.backend
            .insert_documents(E::collection_name(), documents)
            .await
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// This consumes the store and should be called when no longer needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown operation fails.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
