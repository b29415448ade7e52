//! In-memory list storage backend for listlayer.
//!
//! This crate provides the reference implementation of the `StoreBackend` trait. It uses
//! async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments. Every other backend is expected to produce the
//! same observable results for the same calls.
//!
//! # Features
//!
//! - **Full predicate algebra** - equality, `$like`/`$notLike`, ranges, `$in` and `$or`
//! - **Relational includes** - convention-based joins, optionally required, nested
//! - **Cascading creates** - child rows nested under a parent are created with it
//! - **Optional persistence** - a JSON snapshot rewritten after every mutation
//!
//! # Quick Start
//!
//! ```ignore
//! use listlayer_memory::InMemoryStore;
//! use listlayer_core::{backend::StoreBackend, query::{Query, Predicate}};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::builder().persist_to("db.json").build().await?;
//!     store.init(&["users".to_string()]).await?;
//!
//!     store.create("users", doc! { "id": 2, "name": "Poppa joe" }.into(), Default::default()).await?;
//!     let poppa = store
//!         .find_one("users", Query::filtered(Predicate::new().like("name", "%joe")))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as listlayer_memory;

pub mod evaluator;
pub mod persist;
pub mod store;

pub use evaluator::{PredicateMatcher, matches};
pub use store::{
    InMemoryBackendFactory,
    InMemoryStore,
    InMemoryStoreBuilder,
    InMemoryStoreConfig,
    MEMORY_BACKEND_TYPE,
};
