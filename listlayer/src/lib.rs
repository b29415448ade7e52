//! Main listlayer crate providing one query surface over many storage backends.
//!
//! This crate is the primary entry point for users of listlayer. It re-exports the core
//! types from the sub-crates, ships the reference in-memory backend and wires both into
//! a ready-to-use [`Dispatcher`](dispatcher::Dispatcher).
//!
//! # Features
//!
//! - **Portable queries** - one where-clause algebra (`$like`, `$gt`, `$in`, `$or`, ...) for every backend
//! - **Relational includes** - joins inferred from `{list}_id` naming conventions
//! - **Per-list routing** - each list lives in the backend the configuration assigns it to
//! - **Reference backend** - an in-memory engine every other backend must agree with
//!
//! # Quick Start
//!
//! ```ignore
//! use listlayer::prelude::*;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let config = DispatcherConfig::from_json_str(r#"{
//!         "dbs": { "main": { "type": "memory" } },
//!         "lists": { "messages": {}, "users": {} }
//!     }"#)?;
//!     let dispatcher = listlayer::connect(config).await?;
//!
//!     dispatcher.create("users", doc! { "id": 2, "name": "Poppa joe" }).await?;
//!     dispatcher.create("messages", doc! { "id": 1, "users_id": 2 }).await?;
//!
//!     let messages = dispatcher
//!         .find(
//!             "messages",
//!             Query::builder().include("users", IncludeSpec::new().required()).build(),
//!         )
//!         .await?;
//!     println!("{messages:?}");
//!
//!     dispatcher.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Backends
//!
//! A backend implements [`StoreBackend`](backend::StoreBackend) and is made available to
//! configurations through a [`BackendFactory`](dispatcher::BackendFactory):
//!
//! ```ignore
//! let registry = listlayer::default_registry().register(MySqlBackendFactory::new());
//! let dispatcher = Dispatcher::connect(config, &registry).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Reference in-memory storage, optionally persisted to a JSON snapshot

use std::path::Path;

use tracing::debug;

pub mod prelude;

pub use listlayer_core::{backend, config, dispatcher, document, error, include, mutation, query};

// Re-export BSON and JSON types for convenience
pub use bson;
pub use serde_json;

/// In-memory storage backend implementations.
pub mod memory {
    pub use listlayer_memory::{
        InMemoryBackendFactory,
        InMemoryStore,
        InMemoryStoreBuilder,
        InMemoryStoreConfig,
        MEMORY_BACKEND_TYPE,
        PredicateMatcher,
        matches,
    };
}

/// A registry with every backend this crate ships (`"memory"`).
pub fn default_registry() -> dispatcher::BackendRegistry {
    dispatcher::BackendRegistry::new().register(memory::InMemoryBackendFactory)
}

/// Connects a dispatcher for `config` using the [`default_registry`].
pub async fn connect(config: config::DispatcherConfig) -> error::StoreResult<dispatcher::Dispatcher> {
    dispatcher::Dispatcher::connect(config, &default_registry()).await
}

/// Reads a JSON configuration file and connects a dispatcher for it.
pub async fn connect_from_path(path: impl AsRef<Path>) -> error::StoreResult<dispatcher::Dispatcher> {
    let path = path.as_ref();
    debug!(path = %path.display(), "loading dispatcher configuration");

    connect(config::DispatcherConfig::from_path(path)?).await
}
