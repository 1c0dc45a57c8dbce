//! Mapping between entities and raw documents, plus field path and type validation.
//!
//! The [`Mapper`] resolves field paths written in application terms into the paths used
//! in stored documents, checks bound values against the declared field types, and
//! converts raw documents into entities or [`Key`]s.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson, spec::ElementType};

use crate::{
    entity::{Entity, FieldKind, ID_KEY, Key, MappedField},
    error::{DocumentStoreError, DocumentStoreResult},
    operator::Operator,
};

/// A field path translated to stored names, with the declared type it points at.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// The canonical, stored-name path.
    pub path: String,
    /// The declared type at the end of the path, or `None` if the path descends
    /// below an untyped field.
    pub kind: Option<FieldKind>,
}

/// Stateless mapping collaborator used by queries and result streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mapper;

impl Mapper {
    /// Resolves a dotted field path against the mapped shape of `E`.
    ///
    /// Each segment may use either the mapped or the stored name. Numeric indexes and
    /// the positional `$` are accepted after array fields. Segments below `Any` and
    /// `Document` fields are passed through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownField`] if a segment does not resolve.
    pub fn validate_field_path<E: Entity>(path: &str) -> DocumentStoreResult<ResolvedPath> {
        let unknown = || DocumentStoreError::UnknownField {
            field: path.to_string(),
            collection: E::collection_name().to_string(),
        };

        if path.is_empty() {
            return Err(unknown());
        }

        let mut fields: &'static [MappedField] = E::mapped_fields();
        let mut kind: Option<FieldKind> = None;
        let mut stored: Vec<&str> = Vec::new();
        let mut segments = path.split('.');

        while let Some(segment) = segments.next() {
            if let Some(element) = kind.as_ref().and_then(FieldKind::element) {
                if segment == "$" || segment.parse::<usize>().is_ok() {
                    stored.push(segment);
                    kind = Some(*element);
                    fields = embedded_fields(element);
                    continue;
                }
            }

            let field = fields
                .iter()
                .find(|f| f.name == segment || f.stored_name == segment)
                .ok_or_else(unknown)?;
            stored.push(field.stored_name);
            kind = Some(field.kind);

            match field.kind {
                FieldKind::Any | FieldKind::Document => {
                    let rest: Vec<&str> = segments.by_ref().collect();
                    if !rest.is_empty() {
                        stored.extend(rest);
                        kind = None;
                    }

                    return Ok(ResolvedPath { path: stored.join("."), kind });
                }
                FieldKind::Embedded(nested) => fields = nested(),
                FieldKind::Array(element) => fields = embedded_fields(element),
                _ => fields = &[],
            }
        }

        Ok(ResolvedPath { path: stored.join("."), kind })
    }

    /// Checks that `value` may be bound to a field of the given kind under `operator`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::TypeMismatch`] when the value does not fit.
    pub fn check_value_type(
        field: &str,
        kind: &FieldKind,
        operator: Operator,
        value: &Bson,
    ) -> DocumentStoreResult<()> {
        let mismatch = |expected: String| DocumentStoreError::TypeMismatch {
            field: field.to_string(),
            expected,
            found: describe_value(value),
        };

        let fits = match operator {
            Operator::Exists => matches!(value, Bson::Boolean(_)),
            Operator::Size => matches!(value, Bson::Int32(_) | Bson::Int64(_)),
            Operator::In | Operator::NotIn | Operator::All => match value {
                Bson::Array(values) => {
                    let target = kind.element().unwrap_or(kind);
                    values.iter().all(|v| accepts(target, v))
                }
                _ => false,
            },
            Operator::ElementMatch => {
                matches!(kind, FieldKind::Any | FieldKind::Array(_))
                    && matches!(value, Bson::Document(_))
            }
            Operator::Near | Operator::Within => {
                matches!(value, Bson::Array(_) | Bson::Document(_))
            }
            _ => accepts(kind, value),
        };

        if fits {
            return Ok(());
        }

        Err(mismatch(match operator {
            Operator::Exists => "boolean".to_string(),
            Operator::Size => "integer".to_string(),
            Operator::In | Operator::NotIn | Operator::All => {
                format!("array of {}", kind.element().unwrap_or(kind).describe())
            }
            Operator::ElementMatch => "document on an array field".to_string(),
            Operator::Near | Operator::Within => "coordinates".to_string(),
            _ => kind.describe(),
        }))
    }

    /// Converts a raw document into an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn document_to_entity<E: Entity>(document: Document) -> DocumentStoreResult<E> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    /// Converts a (usually partial) raw document into an entity, filling every field
    /// missing from the document with its value in `E::default()`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization of the defaults or deserialization fails.
    pub fn document_to_entity_with_defaults<E: Entity + Default>(
        document: Document,
    ) -> DocumentStoreResult<E> {
        let mut merged = Self::entity_to_document(&E::default())?;
        for (key, value) in document {
            merged.insert(key, value);
        }

        Self::document_to_entity(merged)
    }

    /// Extracts the identity of a raw document as a [`Key`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the document has no identity.
    pub fn document_to_key<E: Entity>(mut document: Document) -> DocumentStoreResult<Key<E>> {
        match document.remove(ID_KEY) {
            Some(id) => Ok(Key::new(id)),
            None => Err(DocumentStoreError::InvalidDocument(format!(
                "document in '{}' has no {}",
                E::collection_name(),
                ID_KEY
            ))),
        }
    }

    /// Converts an entity into a raw document for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the entity is not a document.
    pub fn entity_to_document<E: Entity>(entity: &E) -> DocumentStoreResult<Document> {
        match serialize_to_bson(entity)? {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "'{}' entities must serialize to a document, got {}",
                E::collection_name(),
                describe_value(&other)
            ))),
        }
    }
}

fn embedded_fields(kind: &FieldKind) -> &'static [MappedField] {
    match kind {
        FieldKind::Embedded(nested) => nested(),
        _ => &[],
    }
}

fn accepts(kind: &FieldKind, value: &Bson) -> bool {
    match (kind, value) {
        (_, Bson::Null) | (FieldKind::Any, _) => true,
        (FieldKind::String, Bson::String(_) | Bson::RegularExpression(_)) => true,
        (
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::Double,
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_),
        ) => true,
        (FieldKind::Boolean, Bson::Boolean(_)) => true,
        (FieldKind::DateTime, Bson::DateTime(_)) => true,
        (FieldKind::ObjectId, Bson::ObjectId(_)) => true,
        (FieldKind::Binary, Bson::Binary(_)) => true,
        (FieldKind::Document | FieldKind::Embedded(_), Bson::Document(_)) => true,
        (FieldKind::Array(_), Bson::Array(_)) => true,
        (FieldKind::Array(element), single) => accepts(element, single),
        _ => false,
    }
}

fn describe_value(value: &Bson) -> String {
    match value.element_type() {
        ElementType::Double | ElementType::Int32 | ElementType::Int64 => "number".to_string(),
        ElementType::String => "string".to_string(),
        ElementType::EmbeddedDocument => "document".to_string(),
        ElementType::Array => "array".to_string(),
        ElementType::Boolean => "boolean".to_string(),
        other => format!("{other:?}"),
    }
}
