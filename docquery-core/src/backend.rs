//! Storage backend abstraction for the query layer.
//!
//! This module defines the traits a store driver implements so compiled queries can run
//! against it. The query layer only needs three things from a driver: open a cursor for
//! a compiled `find`, count the documents matching a filter, and (for seeding) insert
//! raw documents.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docquery::backend::StoreBackend;
//! use docquery::cursor::PreparedCursor;
//! use bson::doc;
//! use futures::TryStreamExt;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert_documents("users", vec![doc! { "_id": 1, "name": "Alice" }]).await?;
//!
//! let cursor = PreparedCursor::find("users", doc! { "name": "Alice" }, None);
//! let found: Vec<_> = backend.open_cursor(cursor).await?.try_collect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use std::fmt::Debug;

use crate::{cursor::PreparedCursor, error::DocumentStoreResult};

/// A forward-only stream of raw documents produced by an opened cursor.
///
/// Dropping the stream releases the underlying driver cursor.
pub type DocumentCursor = BoxStream<'static, DocumentStoreResult<Document>>;

/// Abstract interface for document store drivers.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. The exact concurrency model is implementation-specific.
///
/// # Error Handling
///
/// Driver failures are reported as [`DocumentStoreError`](crate::error::DocumentStoreError)
/// values and are propagated unchanged by the query layer. Nothing is retried.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new raw documents into a collection.
    ///
    /// The collection is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if a document with the same `_id` is already stored, or a backend error.
    async fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<()>;

    /// Counts the documents in a collection matching a compiled filter.
    ///
    /// No projection, sort, skip or limit applies. A missing collection counts zero.
    async fn count_documents(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Executes a prepared cursor and returns the matching documents as a stream.
    ///
    /// Implementations honor every option carried by the cursor that the store supports.
    /// The returned stream may perform I/O on each pull.
    async fn open_cursor(&self, cursor: PreparedCursor) -> DocumentStoreResult<DocumentCursor>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external connections
    /// should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory trait for configuring and creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
