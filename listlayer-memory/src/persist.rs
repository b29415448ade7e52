//! JSON snapshot persistence for the in-memory store.
//!
//! The whole store is written as one JSON object keyed by collection name. Writes go to a
//! sibling temporary file that is then renamed over the snapshot, so a crash mid-write
//! leaves the previous snapshot intact.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use bson::Document;
use serde::{Deserialize, Serialize};

use listlayer_core::error::{StoreError, StoreResult};

pub(crate) type CollectionMap = HashMap<String, Vec<Document>>;

#[derive(Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    collections: BTreeMap<String, Vec<Document>>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    collections: BTreeMap<&'a str, &'a [Document]>,
}

/// A JSON file holding every collection of a store.
#[derive(Debug, Clone)]
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Snapshot { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot; a missing file is an empty store.
    pub(crate) fn load(&self) -> StoreResult<CollectionMap> {
        if !self.path.exists() {
            return Ok(CollectionMap::new());
        }

        let json = fs::read_to_string(&self.path)
            .map_err(|err| self.error("read", err))?;
        let file: SnapshotFile = serde_json::from_str(&json)
            .map_err(|err| self.error("parse", err))?;

        Ok(file.collections.into_iter().collect())
    }

    /// Replaces the snapshot with the current contents of `collections`.
    pub(crate) fn save(&self, collections: &CollectionMap) -> StoreResult<()> {
        let snapshot = SnapshotRef {
            collections: collections
                .iter()
                .map(|(name, documents)| (name.as_str(), documents.as_slice()))
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;
        let staging = self.staging_path();

        fs::write(&staging, json).map_err(|err| self.error("write", err))?;
        fs::rename(&staging, &self.path).map_err(|err| self.error("replace", err))?;

        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");

        self.path.with_file_name(name)
    }

    fn error(&self, action: &str, err: impl std::fmt::Display) -> StoreError {
        StoreError::Persistence(format!("cannot {action} {}: {err}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn missing_file_loads_as_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(dir.path().join("db.json"));

        assert!(snapshot.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_keeps_collections() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(dir.path().join("db.json"));

        let mut collections = CollectionMap::new();
        collections.insert("users".into(), vec![doc! { "id": 2, "name": "Poppa joe" }]);
        collections.insert("messages".into(), Vec::new());
        snapshot.save(&collections).unwrap();

        let loaded = snapshot.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded["messages"].is_empty());
        assert_eq!(loaded["users"][0].get_str("name").unwrap(), "Poppa joe");
        assert!(!dir.path().join("db.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Snapshot::new(path).load(), Err(StoreError::Persistence(_))));
    }
}
