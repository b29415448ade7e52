//! Write-side request and response types.

use bson::{Bson, Document};

use crate::{
    document::ID_FIELD,
    error::{StoreError, StoreResult},
    query::Predicate,
};

/// Rows handed to `create`: one document or a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateData {
    One(Document),
    Many(Vec<Document>),
}

impl CreateData {
    /// Splits into the documents and whether a single one was given.
    pub fn into_parts(self) -> (Vec<Document>, bool) {
        match self {
            CreateData::One(document) => (vec![document], true),
            CreateData::Many(documents) => (documents, false),
        }
    }
}

impl From<Document> for CreateData {
    fn from(document: Document) -> Self {
        CreateData::One(document)
    }
}

impl From<Vec<Document>> for CreateData {
    fn from(documents: Vec<Document>) -> Self {
        CreateData::Many(documents)
    }
}

/// Options for `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    /// Return the created documents instead of a bare acknowledgement.
    pub return_ref: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        CreateOptions { return_ref: true }
    }
}

impl CreateOptions {
    /// Options that only acknowledge the write.
    pub fn ack_only() -> Self {
        CreateOptions { return_ref: false }
    }
}

/// Outcome of `create`.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    /// The single document that was created, with its identifier.
    One(Document),
    /// The batch that was created, in input order.
    Many(Vec<Document>),
    /// The write succeeded; documents were not requested back.
    Ack,
}

impl Created {
    pub fn is_ack(&self) -> bool {
        matches!(self, Created::Ack)
    }

    /// The created documents; empty for [`Created::Ack`].
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Created::One(document) => vec![document],
            Created::Many(documents) => documents,
            Created::Ack => Vec::new(),
        }
    }
}

/// Field-level merge applied to every document matching `filter`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub filter: Predicate,
    pub data: Document,
}

impl Update {
    pub fn new(filter: Predicate, data: Document) -> Self {
        Update { filter, data }
    }

    /// Rejects updates that would rewrite document identity.
    pub fn validate(&self) -> StoreResult<()> {
        if self.data.contains_key(ID_FIELD) {
            return Err(StoreError::InvalidDocument(format!("'{ID_FIELD}' cannot be updated")));
        }

        Ok(())
    }

    /// Merges the update data into `document`.
    pub fn apply(&self, document: &mut Document) {
        for (key, value) in &self.data {
            document.insert(key.clone(), value.clone());
        }
    }
}

impl TryFrom<Document> for Update {
    type Error = StoreError;

    fn try_from(document: Document) -> StoreResult<Self> {
        let mut update = Update::default();

        for (key, value) in document {
            match (key.as_str(), value) {
                ("where", Bson::Document(filter)) => update.filter = Predicate::try_from(filter)?,
                ("data", Bson::Document(data)) => update.data = data,
                (key, _) => return Err(StoreError::InvalidQuery(format!("unexpected update key '{key}'"))),
            }
        }

        update.validate()?;

        Ok(update)
    }
}
