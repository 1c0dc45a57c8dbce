//! Error types and result types for query building and execution.
//!
//! This module provides the single error type used across the crate.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! Errors fall into four groups:
//!
//! - **Usage errors** - malformed condition strings, mixed projection modes,
//!   sorting a snapshotted query. Raised synchronously while the query is built.
//! - **Unknown operators** - an operator token the translator does not recognize.
//! - **Validation errors** - unknown field paths and value/field type mismatches.
//!   Only raised while validation is enabled on the query.
//! - **Store errors** - anything the underlying driver reports. Propagated unchanged.

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when building or running a query.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when mapping between entities and BSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A condition string passed to `filter` could not be parsed.
    #[error("'{0}' is not a legal filter condition")]
    IllegalCondition(String),
    /// An operator token is not one of the recognized comparison operators.
    #[error("Unknown operator '{0}'")]
    InvalidOperator(String),
    /// The query builder was asked to do something its current state forbids.
    #[error("Illegal query state: {0}")]
    IllegalState(String),
    /// A field path does not resolve against the mapped shape of the entity.
    #[error("The field '{field}' could not be found in '{collection}'")]
    UnknownField {
        /// The path as written by the caller.
        field: String,
        /// The collection of the entity the path was validated against.
        collection: String,
    },
    /// A bound value does not fit the declared type of the mapped field.
    #[error("Type mismatch on '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        /// The canonical field path.
        field: String,
        /// Description of the accepted value type.
        expected: String,
        /// Description of the value that was supplied.
        found: String,
    },
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document has an invalid structure (for example a missing identity).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns `true` for errors caused by misuse of the query builder.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::IllegalCondition(_) | DocumentStoreError::IllegalState(_)
        )
    }

    /// Returns `true` for field name and field type validation failures.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::UnknownField { .. } | DocumentStoreError::TypeMismatch { .. }
        )
    }
}

/// A specialized `Result` type for document store operations.
///
/// This type alias is used throughout the crate to indicate operations that may fail
/// with a [`DocumentStoreError`].
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
