//! Dispatcher configuration.
//!
//! The configuration names every backend (`dbs`) with its type and a free-form JSON
//! config block, and maps every list to the backend that owns it. With a single backend
//! the list mapping may be omitted and all lists route to that backend.
//!
//! ```json
//! {
//!   "dbs": { "main": { "type": "memory", "config": { "file": "db.json" } } },
//!   "lists": { "messages": { "db": "main" }, "users": {} }
//! }
//! ```

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// One configured backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Registered backend type, e.g. `"memory"`.
    #[serde(rename = "type")]
    pub backend_type: String,
    /// Backend specific settings, handed to the backend factory untouched.
    #[serde(default)]
    pub config: Value,
}

/// Routing entry for one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListConfig {
    /// Owning backend; may be omitted when only one backend is configured.
    #[serde(default)]
    pub db: Option<String>,
}

/// Backends and list routing for a [`Dispatcher`](crate::dispatcher::Dispatcher).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub dbs: BTreeMap<String, BackendConfig>,
    #[serde(default)]
    pub lists: BTreeMap<String, ListConfig>,
}

impl DispatcherConfig {
    pub fn new() -> Self {
        DispatcherConfig::default()
    }

    /// Parses a JSON configuration.
    pub fn from_json_str(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            StoreError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;

        Self::from_json_str(&json)
    }

    /// Adds a backend named `name` of type `backend_type`.
    pub fn backend(mut self, name: impl Into<String>, backend_type: impl Into<String>, config: Value) -> Self {
        self.dbs.insert(name.into(), BackendConfig { backend_type: backend_type.into(), config });
        self
    }

    /// Routes `list` to the backend `db`.
    pub fn list(mut self, list: impl Into<String>, db: impl Into<String>) -> Self {
        self.lists.insert(list.into(), ListConfig { db: Some(db.into()) });
        self
    }

    /// Checks that every list resolves to exactly one configured backend.
    pub fn validate(&self) -> StoreResult<()> {
        if self.dbs.is_empty() {
            return Err(StoreError::Configuration("no backends configured".into()));
        }

        for (list, route) in &self.lists {
            match &route.db {
                Some(db) if !self.dbs.contains_key(db) => {
                    return Err(StoreError::Configuration(
                        format!("list '{list}' is routed to unknown backend '{db}'")
                    ));
                }
                None if self.dbs.len() > 1 => {
                    return Err(StoreError::Configuration(
                        format!("list '{list}' does not name a backend")
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// The single backend every list implicitly belongs to, if there is exactly one.
    pub fn sole_backend(&self) -> Option<&str> {
        match self.dbs.keys().collect::<Vec<_>>().as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// The lists a backend serves.
    pub fn lists_for(&self, db: &str) -> Vec<String> {
        if self.sole_backend() == Some(db) {
            return self.lists.keys().cloned().collect();
        }

        self.lists
            .iter()
            .filter(|(_, route)| route.db.as_deref() == Some(db))
            .map(|(list, _)| list.clone())
            .collect()
    }
}
