//! In-memory document storage backend for docquery.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It understands the same native filter grammar the query compiler emits, which makes it
//! a drop-in store for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Native filters** - Comparison, set, array and logical operators over dotted paths
//! - **Cursor options** - Sorting, skip, limit and include/exclude projections
//!
//! # Quick Start
//!
//! ```ignore
//! use docquery::{DocumentStore, memory::InMemoryStore, backend::StoreBackendBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     store.insert(&[hotel]).await?;
//!
//!     let mut query = store.query::<Hotel>();
//!     query.filter("stars >=", 4)?;
//!     let hotels = query.as_list().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docquery_memory;

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
