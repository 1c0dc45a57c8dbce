//! A query compiler and result materialization layer for schemaless document stores.
//!
//! This crate is the core of the docquery project and provides:
//!
//! - **Operators** ([`operator`]) - Translation of textual comparison tokens to operators
//! - **Criteria** ([`criteria`]) - The criteria tree and its compilation to filter documents
//! - **Query builder** ([`query`]) - Fluent query construction, compilation and execution
//! - **Field builders** ([`field`]) - Per-field criteria builders
//! - **Cursors** ([`cursor`]) - Prepared cursor descriptions and their configuration
//! - **Entity mapping** ([`entity`], [`mapper`]) - Entity metadata, path and type validation
//! - **Result streams** ([`stream`], [`cache`]) - Lazy materialization with identity caching
//! - **Store backend abstraction** ([`backend`]) - Traits implemented by store drivers
//! - **Document store** ([`store`]) - Entry point binding entities to a backend
//! - **Error handling** ([`error`]) - Comprehensive error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docquery::prelude::*;
//!
//! let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!
//! let mut query = store.query::<Hotel>();
//! query.filter("stars >=", 4)?.order("-stars")?;
//!
//! for hotel in query.as_list().await? {
//!     println!("{}", hotel.name);
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docquery_core;

pub mod backend;
pub mod cache;
pub mod criteria;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod field;
pub mod mapper;
pub mod operator;
pub mod query;
pub mod store;
pub mod stream;

#[cfg(test)]
mod testing;
