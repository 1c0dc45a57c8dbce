//! Convenient re-exports of commonly used types from docquery.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docquery::prelude::*;
//! ```
//!
//! This provides access to:
//! - Entity metadata and keys
//! - Store backends and builders
//! - Query construction and criteria groups
//! - Result streams and their cache
//! - Error types

pub use docquery_core::{
    store::DocumentStore,
    entity::{Entity, FieldKind, Key, MappedField, ID_KEY},
    backend::{StoreBackend, StoreBackendBuilder, DocumentCursor},
    query::{Query, QuerySpec},
    field::{FieldEnd, FieldScope, GroupScope, QueryScope},
    criteria::{CriteriaJoin, CriteriaRef, WhereExpression},
    cursor::{CursorConfigurator, CursorFlag, CursorOptions, PreparedCursor},
    operator::Operator,
    stream::{KeyStream, ResultStream},
    cache::{CacheStats, EntityCache},
    error::{DocumentStoreError, DocumentStoreResult},
};
