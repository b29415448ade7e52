//! Document identity helpers and typed conversions.
//!
//! Stored rows are plain [`bson::Document`] values. Every row carries an `id` field; when a
//! caller does not supply one, [`ensure_id`] generates an opaque UUID v4 string. Relations
//! between lists are expressed by naming convention: a row of `messages` that belongs to a
//! row of `users` carries `users_id` (see [`foreign_key`]).

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Name of the identifier field every stored document carries.
pub const ID_FIELD: &str = "id";

/// Generates a new opaque document identifier.
pub fn generate_id() -> Bson {
    Bson::String(Uuid::new_v4().to_string())
}

/// Returns the conventional foreign key name pointing at rows of `list`.
///
/// ```ignore
/// assert_eq!(foreign_key("users"), "users_id");
/// ```
pub fn foreign_key(list: &str) -> String {
    format!("{list}_{ID_FIELD}")
}

/// Returns the document's identifier, if it has a non-null one.
pub fn document_id(document: &Document) -> Option<&Bson> {
    match document.get(ID_FIELD) {
        None | Some(Bson::Null) => None,
        Some(id) => Some(id),
    }
}

/// Makes sure `document` has an identifier and returns it.
///
/// A generated identifier is placed as the first field so that freshly created rows read
/// naturally when printed.
pub fn ensure_id(document: &mut Document) -> Bson {
    if let Some(id) = document_id(document) {
        return id.clone();
    }

    let id = generate_id();
    let fields = std::mem::take(document)
        .into_iter()
        .filter(|(key, _)| key != ID_FIELD);

    *document = Document::from_iter(
        std::iter::once((ID_FIELD.to_string(), id.clone())).chain(fields)
    );

    id
}

/// Converts any serializable value into a document.
///
/// # Errors
///
/// Returns [`StoreError::InvalidDocument`] if the value does not serialize to a map.
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(StoreError::InvalidDocument(
            format!("expected a document, got {:?}", other.element_type())
        )),
    }
}

/// Deserializes a stored document into a typed value.
pub fn from_document<T: for<'de> Deserialize<'de>>(document: Document) -> StoreResult<T> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}
