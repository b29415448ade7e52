//! Convenient re-exports of commonly used types from listlayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use listlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The dispatcher, its configuration and backend registry
//! - Store backends and builders
//! - Query construction and filtering
//! - Create and update requests
//! - Error types

pub use listlayer_core::{
    backend::{Action, StoreBackend, StoreBackendBuilder},
    config::{BackendConfig, DispatcherConfig, ListConfig},
    dispatcher::{BackendFactory, BackendRegistry, Dispatcher},
    mutation::{CreateData, CreateOptions, Created, Update},
    query::{FieldOp, Include, IncludeSpec, OrderBy, Predicate, PredicateVisitor, Query, QueryBuilder, SortDirection},
    error::{StoreError, StoreResult},
};

pub use listlayer_memory::InMemoryStore;
