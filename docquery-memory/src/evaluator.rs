//! Filter, sort and projection evaluation for in-memory documents.
//!
//! This module interprets compiled native filter documents, so the in-memory store
//! accepts exactly what the query compiler emits for a real document store.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docquery_core::{
    entity::ID_KEY,
    error::{DocumentStoreError, DocumentStoreResult},
};

static NULL: Bson = Bson::Null;

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64`. Values of different types compare by their
/// type rank, the way the store orders mixed-type fields.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(HashMap<&'a str, Comparable<'a>>),
    Array(Vec<Comparable<'a>>),
    Binary(&'a [u8]),
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    /// Any other BSON type; only equal to itself by rank.
    Other,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Binary(value) => Comparable::Binary(&value.bytes),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Other,
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Binary(_) => 6,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other => 10,
        }
    }

    /// Total order used for sorting: type rank first, then value.
    ///
    /// NaN sorts below every other number. Arrays compare element by element and maps
    /// entry by entry in key order.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b)
                .map(|(left, right)| left.total_cmp(right))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Map(a), Comparable::Map(b)) => {
                let (a, b) = (sorted_entries(a), sorted_entries(b));
                a.iter()
                    .zip(&b)
                    .map(|((left_key, left), (right_key, right))| {
                        left_key.cmp(right_key).then_with(|| left.total_cmp(right))
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or_else(|| a.len().cmp(&b.len()))
            }
            _ if self.rank() != other.rank() => self.rank().cmp(&other.rank()),
            _ => self.partial_cmp(other).unwrap_or(Ordering::Equal),
        }
    }
}

fn sorted_entries<'m, 'a>(map: &'m HashMap<&'a str, Comparable<'a>>) -> Vec<(&'a str, &'m Comparable<'a>)> {
    let mut entries: Vec<_> = map.iter().map(|(key, value)| (*key, value)).collect();
    entries.sort_unstable_by_key(|(key, _)| *key);
    entries
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Binary(a), Comparable::Binary(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    /// Only values of the same type are ordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::Binary(a), Comparable::Binary(b)) => a.partial_cmp(b),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

fn same(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

fn unsupported(operator: &str) -> DocumentStoreError {
    DocumentStoreError::Backend(format!(
        "operator '{operator}' is not supported by the in-memory store"
    ))
}

/// Evaluates compiled filter documents against stored documents.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns whether the document matches every top-level entry of `filter`.
    ///
    /// # Errors
    ///
    /// Returns a backend error for malformed filters and for `$where`, `$near` and
    /// `$within`, which need a server to evaluate.
    pub fn evaluate(&self, filter: &Document) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            if !self.visit_entry(key, condition)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = Document>,
        filter: &Document,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(&document).evaluate(filter)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn visit_entry(&self, key: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        match key {
            "$and" => {
                for clause in clauses(key, condition)? {
                    if !self.evaluate(clause)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            "$or" => {
                for clause in clauses(key, condition)? {
                    if self.evaluate(clause)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            "$nor" => {
                for clause in clauses(key, condition)? {
                    if self.evaluate(clause)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ if key.starts_with('$') => Err(unsupported(key)),
            _ => {
                let values = resolve(self.document, key);
                visit_condition(&values, condition)
            }
        }
    }
}

fn clauses<'c>(key: &str, condition: &'c Bson) -> DocumentStoreResult<Vec<&'c Document>> {
    let malformed = || DocumentStoreError::Backend(format!("{key} expects an array of documents"));

    match condition {
        Bson::Array(items) => items
            .iter()
            .map(|item| item.as_document().ok_or_else(malformed))
            .collect(),
        _ => Err(malformed()),
    }
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

/// Matches the values found at one field path against a condition.
fn visit_condition(values: &[&Bson], condition: &Bson) -> DocumentStoreResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(operators) => {
            for (operator, argument) in operators {
                if !visit_operator(values, operator, argument)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals_any(values, condition)),
    }
}

fn visit_operator(values: &[&Bson], operator: &str, argument: &Bson) -> DocumentStoreResult<bool> {
    let compare = |accept: fn(Ordering) -> bool| {
        expand(values).iter().any(|value| {
            Comparable::from(*value)
                .partial_cmp(&Comparable::from(argument))
                .is_some_and(accept)
        })
    };

    match operator {
        "$eq" => Ok(equals_any(values, argument)),
        "$ne" => Ok(!equals_any(values, argument)),
        "$gt" => Ok(compare(Ordering::is_gt)),
        "$gte" => Ok(compare(Ordering::is_ge)),
        "$lt" => Ok(compare(Ordering::is_lt)),
        "$lte" => Ok(compare(Ordering::is_le)),
        "$in" => Ok(array_argument(operator, argument)?
            .iter()
            .any(|candidate| equals_any(values, candidate))),
        "$nin" => Ok(!array_argument(operator, argument)?
            .iter()
            .any(|candidate| equals_any(values, candidate))),
        "$all" => {
            let required = array_argument(operator, argument)?;
            Ok(!required.is_empty() && required.iter().all(|candidate| equals_any(values, candidate)))
        }
        "$exists" => Ok(!values.is_empty() == truthy(argument)),
        "$size" => {
            let size = match argument {
                Bson::Int32(size) => *size as i64,
                Bson::Int64(size) => *size,
                Bson::Double(size) => *size as i64,
                _ => return Err(DocumentStoreError::Backend("$size expects a number".to_string())),
            };
            Ok(values
                .iter()
                .any(|value| matches!(value, Bson::Array(items) if items.len() as i64 == size)))
        }
        "$elemMatch" => {
            let query = argument.as_document().ok_or_else(|| {
                DocumentStoreError::Backend("$elemMatch expects a document".to_string())
            })?;
            visit_element_match(values, query)
        }
        "$not" => match argument {
            Bson::Document(inner) if is_operator_document(inner) => {
                Ok(!visit_condition(values, argument)?)
            }
            _ => Err(DocumentStoreError::Backend("$not expects an operator document".to_string())),
        },
        _ => Err(unsupported(operator)),
    }
}

fn visit_element_match(values: &[&Bson], query: &Document) -> DocumentStoreResult<bool> {
    for value in values {
        let Bson::Array(items) = value else {
            continue;
        };

        for item in items {
            let matched = if is_operator_document(query) {
                visit_condition(&[item], &Bson::Document(query.clone()))?
            } else {
                match item {
                    Bson::Document(element) => DocumentEvaluator::new(element).evaluate(query)?,
                    _ => false,
                }
            };

            if matched {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn array_argument<'c>(operator: &str, argument: &'c Bson) -> DocumentStoreResult<&'c Vec<Bson>> {
    argument
        .as_array()
        .ok_or_else(|| DocumentStoreError::Backend(format!("{operator} expects an array")))
}

/// Equality with implicit array membership. A missing field equals null.
fn equals_any(values: &[&Bson], argument: &Bson) -> bool {
    if values.is_empty() {
        return same(&NULL, argument);
    }

    values
        .iter()
        .any(|value| same(value, argument) || expand(&[*value]).iter().any(|item| same(item, argument)))
}

/// Each value followed by its elements when it is an array.
fn expand<'d>(values: &[&'d Bson]) -> Vec<&'d Bson> {
    if values.is_empty() {
        return vec![&NULL];
    }

    let mut expanded = Vec::new();
    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }

    expanded
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Collects every value reachable through a dotted path, descending into arrays.
pub(crate) fn resolve<'d>(document: &'d Document, path: &str) -> Vec<&'d Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();

    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            resolve_value(value, rest, &mut found);
        }
    }

    found
}

fn resolve_value<'d>(value: &'d Bson, segments: &[&str], found: &mut Vec<&'d Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(document) => {
            if let Some(value) = document.get(*head) {
                resolve_value(value, rest, found);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    resolve_value(item, rest, found);
                }
            }

            for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                resolve_value(item, segments, found);
            }
        }
        _ => {}
    }
}

/// Orders two documents by a sort specification such as `{ "name": 1, "stars": -1 }`.
pub(crate) fn compare_documents(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let left_value = resolve(left, field).first().copied().unwrap_or(&NULL);
        let right_value = resolve(right, field).first().copied().unwrap_or(&NULL);

        let ordering = Comparable::from(left_value).total_cmp(&Comparable::from(right_value));
        let ordering = if is_descending(direction) { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn is_descending(direction: &Bson) -> bool {
    match direction {
        Bson::Int32(value) => *value < 0,
        Bson::Int64(value) => *value < 0,
        Bson::Double(value) => *value < 0.0,
        _ => false,
    }
}

/// Applies an include or exclude projection.
///
/// Include mode keeps `_id` unless it is explicitly excluded. The mode comes from the
/// first non-`_id` entry, or from `_id` itself when it is the only entry.
pub(crate) fn project(document: Document, projection: &Document) -> Document {
    let include = projection
        .iter()
        .find(|(field, _)| field.as_str() != ID_KEY)
        .or_else(|| projection.iter().next())
        .is_none_or(|(_, value)| truthy(value));

    if !include {
        let mut projected = document;
        for (field, _) in projection {
            remove_path(&mut projected, field);
        }
        return projected;
    }

    let mut projected = Document::new();
    if projection.get(ID_KEY).is_none_or(truthy) {
        if let Some(id) = document.get(ID_KEY) {
            projected.insert(ID_KEY, id.clone());
        }
    }

    for (field, value) in projection {
        if field != ID_KEY && truthy(value) {
            copy_path(&document, &mut projected, field);
        }
    }

    projected
}

fn copy_path(source: &Document, target: &mut Document, path: &str) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let Some(value) = source.get(head) else {
        return;
    };

    match (rest, value) {
        (None, value) => {
            target.insert(head, value.clone());
        }
        (Some(rest), Bson::Document(inner)) => {
            if !matches!(target.get(head), Some(Bson::Document(_))) {
                target.insert(head, Document::new());
            }
            if let Some(Bson::Document(nested)) = target.get_mut(head) {
                copy_path(inner, nested, rest);
            }
        }
        _ => {}
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(nested)) = document.get_mut(head) {
                remove_path(nested, rest);
            }
        }
    }
}
