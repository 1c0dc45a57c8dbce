//! Fixtures shared by the unit tests of this crate.

use async_trait::async_trait;
use bson::Document;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::{
    backend::{DocumentCursor, StoreBackend},
    cursor::PreparedCursor,
    entity::{Entity, FieldKind, MappedField},
    error::DocumentStoreResult,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: String,
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stars: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub address: Address,
    #[serde(default, rename = "extra")]
    pub details: Document,
}

static ADDRESS_FIELDS: [MappedField; 2] = [
    MappedField::new("street", FieldKind::String),
    MappedField::new("city", FieldKind::String),
];

fn address_fields() -> &'static [MappedField] {
    &ADDRESS_FIELDS
}

static HOTEL_FIELDS: [MappedField; 6] = [
    MappedField::new("id", FieldKind::String).stored_as("_id"),
    MappedField::new("name", FieldKind::String),
    MappedField::new("stars", FieldKind::Int32),
    MappedField::new("tags", FieldKind::Array(&FieldKind::String)),
    MappedField::new("address", FieldKind::Embedded(address_fields)),
    MappedField::new("details", FieldKind::Document).stored_as("extra"),
];

impl Entity for Hotel {
    fn collection_name() -> &'static str {
        "hotels"
    }

    fn mapped_fields() -> &'static [MappedField] {
        &HOTEL_FIELDS
    }
}

/// Backend that records every prepared cursor and count filter it receives.
///
/// Cursors yield the canned documents, truncated to the cursor limit.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    documents: Vec<Document>,
    cursors: Mutex<Vec<PreparedCursor>>,
    counts: Mutex<Vec<Document>>,
}

impl RecordingBackend {
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    pub fn cursors(&self) -> Vec<PreparedCursor> {
        self.cursors.lock().unwrap().clone()
    }

    pub fn last_cursor(&self) -> PreparedCursor {
        self.cursors.lock().unwrap().last().cloned().unwrap()
    }

    pub fn counts(&self) -> Vec<Document> {
        self.counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoreBackend for RecordingBackend {
    async fn insert_documents(
        &self,
        _collection: &str,
        _documents: Vec<Document>,
    ) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn count_documents(&self, _collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.counts.lock().unwrap().push(filter);
        Ok(self.documents.len() as u64)
    }

    async fn open_cursor(&self, cursor: PreparedCursor) -> DocumentStoreResult<DocumentCursor> {
        let limit = cursor
            .options()
            .limit
            .map_or(usize::MAX, |limit| limit as usize);
        self.cursors.lock().unwrap().push(cursor);

        let documents: Vec<_> = self.documents.iter().take(limit).cloned().map(Ok).collect();
        Ok(stream::iter(documents).boxed())
    }
}
