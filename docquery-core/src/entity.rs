//! Core traits and types for entity representation and mapping metadata.
//!
//! This module provides the trait every queryable entity implements, the mapping
//! metadata used to validate field paths and bound values, and the [`Key`] type that
//! identifies a stored entity without materializing it.

use bson::Bson;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, marker::PhantomData};

/// Name of the identity field in every stored document.
pub const ID_KEY: &str = "_id";

/// Core trait that all entities queried through this crate must implement.
///
/// An entity maps to one document in one collection. Serialization is driven by serde;
/// the identity must be serialized under [`ID_KEY`] (usually with
/// `#[serde(rename = "_id")]`).
///
/// # Example
///
/// ```ignore
/// use docquery::entity::{Entity, FieldKind, MappedField};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id")]
///     pub id: String,
///     pub name: String,
///     pub age: i32,
/// }
///
/// static USER_FIELDS: [MappedField; 3] = [
///     MappedField::new("id", FieldKind::String).stored_as("_id"),
///     MappedField::new("name", FieldKind::String),
///     MappedField::new("age", FieldKind::Int32),
/// ];
///
/// impl Entity for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
///
///     fn mapped_fields() -> &'static [MappedField] {
///         &USER_FIELDS
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the name of the collection this entity is stored in.
    fn collection_name() -> &'static str;

    /// Returns the mapped shape of the entity, used for field path and type validation.
    fn mapped_fields() -> &'static [MappedField];

    /// Whether queries for this entity may read from secondary members by default.
    fn secondary_ok() -> bool {
        false
    }
}

/// Mapping metadata for a single field of an entity.
#[derive(Debug, Clone, Copy)]
pub struct MappedField {
    /// The field name as written in application code.
    pub name: &'static str,
    /// The field name in the stored document.
    pub stored_name: &'static str,
    /// The declared type of the field.
    pub kind: FieldKind,
}

impl MappedField {
    /// Creates a field stored under its own name.
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, stored_name: name, kind }
    }

    /// Stores the field under a different name (for example `_id`).
    pub const fn stored_as(mut self, stored_name: &'static str) -> Self {
        self.stored_name = stored_name;
        self
    }
}

/// Declared type of a mapped field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Any value. Paths below this field are not validated.
    Any,
    String,
    Int32,
    Int64,
    Double,
    Boolean,
    DateTime,
    ObjectId,
    Binary,
    /// A free-form sub-document. Paths below this field are not validated.
    Document,
    /// An array whose elements have the given kind.
    Array(&'static FieldKind),
    /// An embedded entity with its own mapped fields.
    Embedded(fn() -> &'static [MappedField]),
}

impl FieldKind {
    /// Short human readable name, used in type mismatch errors.
    pub fn describe(&self) -> String {
        match self {
            FieldKind::Any => "any value".to_string(),
            FieldKind::String => "string".to_string(),
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::Double => "number".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::DateTime => "datetime".to_string(),
            FieldKind::ObjectId => "objectId".to_string(),
            FieldKind::Binary => "binary".to_string(),
            FieldKind::Document | FieldKind::Embedded(_) => "document".to_string(),
            FieldKind::Array(inner) => format!("array of {}", inner.describe()),
        }
    }

    /// Returns the element kind for array fields.
    pub fn element(&self) -> Option<&'static FieldKind> {
        match self {
            FieldKind::Array(inner) => Some(inner),
            _ => None,
        }
    }
}

/// A typed reference to a stored entity: its collection and identity value.
pub struct Key<E> {
    collection: String,
    id: Bson,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Key<E> {
    /// Creates a key for the given identity in the entity's collection.
    pub fn new(id: impl Into<Bson>) -> Self {
        Self::with_collection(E::collection_name(), id)
    }
}

impl<E> Key<E> {
    /// Creates a key for the given identity in an explicitly named collection.
    pub fn with_collection(collection: impl Into<String>, id: impl Into<Bson>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the collection the keyed entity lives in.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the identity value.
    pub fn id(&self) -> &Bson {
        &self.id
    }
}

impl<E> Clone for Key<E> {
    fn clone(&self) -> Self {
        Self::with_collection(self.collection.clone(), self.id.clone())
    }
}

impl<E> PartialEq for Key<E> {
    fn eq(&self, other: &Self) -> bool {
        self.collection == other.collection && self.id == other.id
    }
}

impl<E> fmt::Debug for Key<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("collection", &self.collection)
            .field("id", &self.id)
            .finish()
    }
}

impl<E> fmt::Display for Key<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.id)
    }
}
