//! In-memory storage implementation for list stores.
//!
//! This module provides the reference backend: every collection is a vector of BSON
//! documents in insertion order, guarded by an async-aware read-write lock, optionally
//! mirrored to a JSON snapshot on disk.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use listlayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    dispatcher::BackendFactory,
    document::{document_id, ensure_id, foreign_key},
    error::{StoreError, StoreResult},
    include::resolve_includes,
    mutation::{CreateData, CreateOptions, Created, Update},
    query::{Predicate, Query},
};

use crate::{
    evaluator::{PredicateMatcher, sort_documents, values_equal},
    persist::{CollectionMap, Snapshot},
};

/// Backend type name the [`InMemoryBackendFactory`] registers under.
pub const MEMORY_BACKEND_TYPE: &str = "memory";

/// Thread-safe in-memory list storage backend.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully functional list
/// store that operates entirely in memory using async-aware read-write locks.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to
/// be safely shared across async tasks. Multiple clones of the same instance share the
/// same underlying data. Every mutation runs under a single write guard; no guard is held
/// while includes are resolved.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing), and includes issue one
/// lookup per result row. This is the reference engine, sized for tests and small data.
///
/// # Example
///
/// ```ignore
/// use listlayer_memory::InMemoryStore;
/// use listlayer::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// store.create("users", doc! { "name": "Alice" }.into(), Default::default()).await?;
/// let users = store.find("users", Query::new()).await?;
/// assert_eq!(users.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    collections: Arc<RwLock<CollectionMap>>,
    /// Snapshot rewritten after every mutation, when persistence is enabled
    snapshot: Option<Arc<Snapshot>>,
}

impl InMemoryStore {
    /// Creates a new empty, non-persistent store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    ///
    /// ```ignore
    /// let store = InMemoryStore::builder().persist_to("db.json").build().await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    fn persist(&self, collections: &CollectionMap) -> StoreResult<()> {
        match &self.snapshot {
            Some(snapshot) => snapshot.save(collections),
            None => Ok(()),
        }
    }

    /// Remembers `list` as it is now, when there is a snapshot to keep in sync.
    fn undo_point(&self, collections: &CollectionMap, list: &str) -> Option<Undo> {
        self.snapshot.as_ref().map(|_| Undo {
            list: list.to_string(),
            previous: collections.get(list).cloned(),
        })
    }

    /// Persists a change; if the snapshot cannot be written the change is undone.
    fn commit(&self, collections: &mut CollectionMap, undo: Option<Undo>) -> StoreResult<()> {
        let Err(err) = self.persist(collections) else {
            return Ok(());
        };

        if let Some(Undo { list, previous }) = undo {
            warn!(list = %list, error = %err, "snapshot write failed; change rolled back");

            match previous {
                Some(documents) => {
                    collections.insert(list, documents);
                }
                None => {
                    collections.remove(&list);
                }
            }
        }

        Err(err)
    }
}

/// A collection's contents before a mutation; `None` if it did not exist.
struct Undo {
    list: String,
    previous: Option<Vec<Document>>,
}

fn id_label(id: &Bson) -> String {
    match id {
        Bson::String(id) => id.clone(),
        other => other.to_string(),
    }
}

/// Fails if any incoming id is already stored or repeats within the batch.
fn check_new_ids(list: &str, existing: &[Document], incoming: &[&Document]) -> StoreResult<()> {
    for (index, document) in incoming.iter().enumerate() {
        let Some(id) = document_id(document) else {
            continue;
        };

        let clash = existing
            .iter()
            .chain(incoming[..index].iter().copied())
            .filter_map(document_id)
            .any(|other| values_equal(other, id));

        if clash {
            return Err(StoreError::DocumentAlreadyExists(id_label(id), list.to_string()));
        }
    }

    Ok(())
}

/// Children to create in other collections once their parent is stored.
type Nested = Vec<(String, Vec<Document>)>;

/// Detaches every field named after a known collection that holds an array of documents.
fn split_nested(document: &mut Document, collections: &CollectionMap) -> StoreResult<Nested> {
    let names = document
        .iter()
        .filter(|(key, value)| matches!(value, Bson::Array(_)) && collections.contains_key(key.as_str()))
        .map(|(key, _)| key.clone())
        .collect::<Vec<_>>();

    let mut nested = Nested::with_capacity(names.len());

    for name in names {
        let Some(Bson::Array(items)) = document.remove(&name) else {
            continue;
        };

        let children = items
            .into_iter()
            .map(|item| match item {
                Bson::Document(child) => Ok(child),
                other => Err(StoreError::InvalidDocument(format!(
                    "nested '{name}' entries must be documents, found {other}"
                ))),
            })
            .collect::<StoreResult<Vec<_>>>()?;

        nested.push((name, children));
    }

    Ok(nested)
}

fn paginate(rows: Vec<Document>, offset: Option<usize>, limit: Option<usize>) -> Vec<Document> {
    rows.into_iter()
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn init(&self, lists: &[String]) -> StoreResult<()> {
        let mut collections = self.collections.write().await;

        let added = lists
            .iter()
            .filter(|list| !collections.contains_key(list.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        for list in &added {
            collections.insert(list.clone(), Vec::new());
        }

        if let Err(err) = self.persist(&collections) {
            for list in &added {
                collections.remove(list);
            }
            return Err(err);
        }
        debug!(lists = lists.len(), added = added.len(), "initialized in-memory store");

        Ok(())
    }

    async fn create_collection(&self, name: &str, initial_items: Vec<Document>) -> StoreResult<()> {
        let mut collections = self.collections.write().await;

        if collections.contains_key(name) {
            debug!(collection = name, "collection already exists");
            return Ok(());
        }

        let mut items = initial_items;
        for item in &mut items {
            ensure_id(item);
        }
        check_new_ids(name, &[], &items.iter().collect::<Vec<_>>())?;

        debug!(collection = name, items = items.len(), "created collection");
        let undo = self.undo_point(&collections, name);
        collections.insert(name.to_string(), items);
        self.commit(&mut collections, undo)
    }

    async fn remove_collection(&self, name: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;

        let removed = collections
            .remove(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        let undo = self.snapshot.as_ref().map(|_| Undo {
            list: name.to_string(),
            previous: Some(removed),
        });

        debug!(collection = name, "removed collection");
        self.commit(&mut collections, undo)
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names = self
            .collections
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort_unstable();

        Ok(names)
    }

    async fn create(
        &self,
        list: &str,
        data: CreateData,
        options: CreateOptions,
    ) -> StoreResult<Created> {
        let (documents, single) = data.into_parts();

        let prepared = {
            let mut collections = self.collections.write().await;

            let mut prepared = Vec::with_capacity(documents.len());
            for mut document in documents {
                ensure_id(&mut document);
                let nested = split_nested(&mut document, &collections)?;
                prepared.push((document, nested));
            }

            let existing = collections.get(list).map(Vec::as_slice).unwrap_or(&[]);
            check_new_ids(list, existing, &prepared.iter().map(|(document, _)| document).collect::<Vec<_>>())?;

            let undo = self.undo_point(&collections, list);
            collections
                .entry(list.to_string())
                .or_default()
                .extend(prepared.iter().map(|(document, _)| document.clone()));

            self.commit(&mut collections, undo)?;
            prepared
        };

        let mut created = Vec::with_capacity(prepared.len());
        for (mut document, nested) in prepared {
            let parent_id = document_id(&document).cloned().unwrap_or(Bson::Null);

            for (child_list, mut children) in nested {
                for child in &mut children {
                    child.insert(foreign_key(list), parent_id.clone());
                }

                let rows = self
                    .create(&child_list, CreateData::Many(children), CreateOptions::default())
                    .await
                    .inspect_err(|err| {
                        warn!(list, child_list = %child_list, error = %err, "nested create failed; parent was kept");
                    })?
                    .into_documents();

                document.insert(child_list, rows.into_iter().map(Bson::Document).collect::<Vec<_>>());
            }

            created.push(document);
        }

        debug!(list, created = created.len(), "created documents");

        if !options.return_ref {
            return Ok(Created::Ack);
        }
        if single {
            if let Some(document) = created.pop() {
                return Ok(Created::One(document));
            }
        }

        Ok(Created::Many(created))
    }

    async fn find(&self, list: &str, query: Query) -> StoreResult<Vec<Document>> {
        let matcher = PredicateMatcher::new(&query.filter)?;

        let mut rows = {
            let collections = self.collections.read().await;
            let collection = collections
                .get(list)
                .ok_or_else(|| StoreError::CollectionNotFound(list.to_string()))?;

            matcher.filter(collection)
        };

        if let Some(order_by) = &query.order_by {
            sort_documents(&mut rows, order_by);
        }

        debug!(list, filter = %query.filter, matched = rows.len(), "find");

        if query.include.is_empty() {
            return Ok(paginate(rows, query.offset, query.limit));
        }

        // Required joins drop rows, so they must run before the page is cut.
        if query.include.has_required() {
            let joined = resolve_includes(self, list, rows, &query.include).await?;
            return Ok(paginate(joined, query.offset, query.limit));
        }

        resolve_includes(self, list, paginate(rows, query.offset, query.limit), &query.include).await
    }

    async fn update_one(&self, list: &str, update: Update) -> StoreResult<Option<Document>> {
        update.validate()?;
        let matcher = PredicateMatcher::new(&update.filter)?;

        let mut collections = self.collections.write().await;
        let undo = self.undo_point(&collections, list);
        let collection = collections
            .get_mut(list)
            .ok_or_else(|| StoreError::CollectionNotFound(list.to_string()))?;

        let Some(document) = collection.iter_mut().find(|document| matcher.matches(document)) else {
            return Ok(None);
        };
        update.apply(document);
        let updated = document.clone();

        self.commit(&mut collections, undo)?;
        debug!(list, filter = %update.filter, "updated one document");

        Ok(Some(updated))
    }

    async fn update_many(&self, list: &str, update: Update) -> StoreResult<usize> {
        update.validate()?;
        let matcher = PredicateMatcher::new(&update.filter)?;

        let mut collections = self.collections.write().await;
        let undo = self.undo_point(&collections, list);
        let collection = collections
            .get_mut(list)
            .ok_or_else(|| StoreError::CollectionNotFound(list.to_string()))?;

        let mut updated = 0;
        for document in collection.iter_mut().filter(|document| matcher.matches(document)) {
            update.apply(document);
            updated += 1;
        }

        if updated > 0 {
            self.commit(&mut collections, undo)?;
        }
        debug!(list, filter = %update.filter, updated, "updated documents");

        Ok(updated)
    }

    async fn delete(&self, list: &str, filter: Predicate) -> StoreResult<usize> {
        let matcher = PredicateMatcher::new(&filter)?;

        let mut collections = self.collections.write().await;
        let undo = self.undo_point(&collections, list);
        let collection = collections
            .get_mut(list)
            .ok_or_else(|| StoreError::CollectionNotFound(list.to_string()))?;

        let before = collection.len();
        collection.retain(|document| !matcher.matches(document));
        let removed = before - collection.len();

        if removed > 0 {
            self.commit(&mut collections, undo)?;
        }
        debug!(list, filter = %filter, removed, "deleted documents");

        Ok(removed)
    }

    async fn close(&self) -> StoreResult<bool> {
        let collections = self.collections.read().await;
        self.persist(&collections)?;

        Ok(true)
    }
}

/// Builder for configuring and constructing an [`InMemoryStore`].
#[derive(Default, Debug, Clone)]
pub struct InMemoryStoreBuilder {
    file: Option<PathBuf>,
}

impl InMemoryStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors the store to a JSON snapshot at `path`, loading it first if it exists.
    ///
    /// A mutation whose snapshot write fails is rolled back in memory and reported as
    /// [`StoreError::Persistence`], so memory never runs ahead of the file.
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> StoreResult<Self::Backend> {
        let Some(file) = self.file else {
            return Ok(InMemoryStore::new());
        };

        let snapshot = Snapshot::new(file);
        let collections = snapshot.load()?;
        info!(
            path = %snapshot.path().display(),
            collections = collections.len(),
            "loaded in-memory store snapshot"
        );

        Ok(InMemoryStore {
            collections: Arc::new(RwLock::new(collections)),
            snapshot: Some(Arc::new(snapshot)),
        })
    }
}

/// The `config` block of a `"memory"` backend.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InMemoryStoreConfig {
    /// JSON snapshot to load from and persist to.
    pub file: Option<PathBuf>,
}

/// Builds [`InMemoryStore`]s for the dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryBackendFactory;

#[async_trait]
impl BackendFactory for InMemoryBackendFactory {
    fn backend_type(&self) -> &str {
        MEMORY_BACKEND_TYPE
    }

    async fn build(&self, config: &Value) -> StoreResult<Arc<dyn StoreBackend>> {
        let config = match config {
            Value::Null => InMemoryStoreConfig::default(),
            config => serde_json::from_value(config.clone()).map_err(|err| {
                StoreError::Configuration(format!("invalid memory backend config: {err}"))
            })?,
        };

        let mut builder = InMemoryStore::builder();
        if let Some(file) = config.file {
            builder = builder.persist_to(file);
        }

        Ok(Arc::new(builder.build().await?))
    }
}
