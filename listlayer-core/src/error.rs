//! Error types and result types for list store operations.
//!
//! Every fallible operation in listlayer returns [`StoreResult<T>`]. Absence of rows is
//! never an error: `find` yields an empty vector and `find_one` yields `None`.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a list store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The dispatcher configuration is unusable, or an action was routed to a backend
    /// that cannot serve it.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A backend failed to build or initialize.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document violates structural constraints.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The query, predicate or include specification is malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Reading or writing a persisted snapshot failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for list store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Persistence(err.to_string())
    }
}
