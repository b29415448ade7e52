//! Core contracts of listlayer, a backend-agnostic list query layer.
//!
//! Callers issue one canonical query shape against named lists and a dispatcher routes
//! the call to whichever storage backend owns the list. This crate provides:
//!
//! - **Query model** ([`query`]) - the portable predicate algebra, includes, paging and ordering
//! - **Write requests** ([`mutation`]) - create input/output and field-level updates
//! - **Backend contract** ([`backend`]) - the trait every storage adapter implements
//! - **Join resolution** ([`include`]) - convention-based relational includes over any backend
//! - **Configuration** ([`config`]) - backend definitions and list routing
//! - **Dispatcher** ([`dispatcher`]) - backend registry, start-up and action routing
//! - **Documents** ([`document`]) - identifier and typed conversion helpers
//! - **Error handling** ([`error`]) - the error taxonomy shared by all backends
//!
//! # Example
//!
//! ```ignore
//! use listlayer_core::query::{Query, Predicate, IncludeSpec};
//!
//! let query = Query::builder()
//!     .filter(Predicate::new().eq("type", "A"))
//!     .include("users", IncludeSpec::new().required())
//!     .build();
//! let messages = dispatcher.find("messages", query).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as listlayer_core;

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod include;
pub mod mutation;
pub mod query;
