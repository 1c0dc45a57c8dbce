//! Main docquery crate providing a unified interface for querying document stores.
//!
//! This crate is the primary entry point for users of the docquery framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! convenient access to the different storage backends.
//!
//! # Features
//!
//! - **Textual conditions** - `query.filter("stars >=", 4)` style criteria with operator tokens
//! - **Field builders** - `query.field("tags").has_any_of(["spa"])` for every operator
//! - **Nested groups** - AND/OR criteria groups compiled into native filter documents
//! - **Validated paths** - Field paths and value types are checked against entity metadata
//! - **Lazy results** - Entities are materialized on demand and deduplicated per stream
//!
//! # Quick Start
//!
//! ```ignore
//! use docquery::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Hotel {
//!     #[serde(rename = "_id")]
//!     pub id: String,
//!     pub name: String,
//!     pub stars: i32,
//! }
//!
//! static HOTEL_FIELDS: [MappedField; 3] = [
//!     MappedField::new("id", FieldKind::String).stored_as("_id"),
//!     MappedField::new("name", FieldKind::String),
//!     MappedField::new("stars", FieldKind::Int32),
//! ];
//!
//! impl Entity for Hotel {
//!     fn collection_name() -> &'static str { "hotels" }
//!     fn mapped_fields() -> &'static [MappedField] { &HOTEL_FIELDS }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!
//!     store.insert(&[Hotel { id: "ritz".into(), name: "Ritz".into(), stars: 5 }]).await?;
//!
//!     let mut query = store.query::<Hotel>();
//!     query.filter("stars >=", 4)?.order("-stars")?;
//!
//!     for hotel in query.as_list().await? {
//!         println!("{}", hotel.name);
//!     }
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Streaming
//!
//! [`Query::fetch`](query::Query::fetch) returns a lazy stream. Documents that share an
//! `_id` within one stream resolve to the same `Arc`:
//!
//! ```ignore
//! use futures::TryStreamExt;
//!
//! let mut hotels = query.fetch().await?;
//! while let Some(hotel) = hotels.try_next().await? {
//!     println!("{hotel:?}");
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docquery_core::{
    backend, cache, criteria, cursor, entity, error, field, mapper, operator, query, store, stream,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docquery_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docquery_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
