//! Storage backend abstraction.
//!
//! Every storage adapter (the in-memory engine here, SQL, document or ORM backed stores
//! elsewhere) implements [`StoreBackend`]. The dispatcher only ever talks to backends
//! through this trait, and the join resolver issues its related lookups through
//! [`StoreBackend::find`], so an adapter that honors the contract gets includes for free.
//!
//! # Example
//!
//! ```ignore
//! use listlayer::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = InMemoryStore::new();
//! backend.init(&["users".to_string()]).await?;
//! backend.create("users", doc! { "name": "Alice" }.into(), Default::default()).await?;
//! let alice = backend
//!     .find_one("users", Query::filtered(Predicate::new().eq("name", "Alice")))
//!     .await?;
//! ```

use std::fmt::{self, Debug};

use async_trait::async_trait;
use bson::Document;

use crate::{
    error::StoreResult,
    mutation::{CreateData, CreateOptions, Created, Update},
    query::{Predicate, Query},
};

/// The caller-facing actions a dispatcher can route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Find,
    FindOne,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Find,
        Action::FindOne,
        Action::Update,
        Action::Delete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Find => "find",
            Action::FindOne => "findOne",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Abstract interface for list storage backends.
///
/// # Thread Safety
///
/// Implementations are shared as `Arc<dyn StoreBackend>` and must be `Send + Sync`. A
/// backend must not hold internal locks across calls it makes back into itself (the join
/// resolver re-enters [`StoreBackend::find`] while a `find` is in flight).
///
/// # Errors
///
/// Operating on a collection the backend does not know is
/// [`StoreError::CollectionNotFound`](crate::error::StoreError::CollectionNotFound), except
/// for `create`, which creates the collection on first write.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Whether this backend implements `action`.
    ///
    /// The dispatcher refuses to route an unsupported action with a configuration error
    /// instead of calling into the backend.
    fn supports(&self, _action: Action) -> bool {
        true
    }

    /// Prepares the backend to serve `lists`. Must be idempotent.
    async fn init(&self, lists: &[String]) -> StoreResult<()>;

    /// Creates a collection seeded with `initial_items`.
    async fn create_collection(&self, name: &str, initial_items: Vec<Document>) -> StoreResult<()>;

    /// Detaches a collection and all of its documents.
    async fn remove_collection(&self, name: &str) -> StoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Inserts one or many documents, assigning identifiers where missing.
    async fn create(
        &self,
        list: &str,
        data: CreateData,
        options: CreateOptions,
    ) -> StoreResult<Created>;

    /// Returns every document matching the query, with includes attached.
    async fn find(&self, list: &str, query: Query) -> StoreResult<Vec<Document>>;

    /// Returns the first document matching the query, or `None`.
    async fn find_one(&self, list: &str, query: Query) -> StoreResult<Option<Document>> {
        let query = Query { limit: Some(1), ..query };

        Ok(self.find(list, query).await?.into_iter().next())
    }

    /// Merges `update.data` into the first match; returns the updated document.
    async fn update_one(&self, list: &str, update: Update) -> StoreResult<Option<Document>>;

    /// Merges `update.data` into every match; returns how many documents changed.
    async fn update_many(&self, list: &str, update: Update) -> StoreResult<usize>;

    /// Removes every match; returns how many documents were removed.
    async fn delete(&self, list: &str, filter: Predicate) -> StoreResult<usize>;

    /// Releases backend resources. Returns `true` once the backend is closed.
    async fn close(&self) -> StoreResult<bool> {
        Ok(true)
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> StoreResult<Self::Backend>;
}
