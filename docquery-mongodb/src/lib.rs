//! MongoDB backend implementation for docquery.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Compiled
//! filters, projections and sorts are already native MongoDB documents and are passed through
//! untouched; cursor options are mapped onto the driver's find options.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docquery = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native queries** - `$where`, geospatial and array operators run on the server
//! - **Lazy cursors** - Results stream from the server in batches as they are consumed
//!
//! # Example
//!
//! ```ignore
//! use docquery::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docquery_mongodb;

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
