//! Routing of list-scoped actions to the backend that owns the list.
//!
//! A [`Dispatcher`] is built once from a [`DispatcherConfig`] and a [`BackendRegistry`]:
//! every configured backend is built by the factory registered for its type, all backends
//! are initialized concurrently, and only then does the dispatcher accept calls. The
//! registry is immutable afterwards.
//!
//! # Example
//!
//! ```ignore
//! let config = DispatcherConfig::new().backend("main", "memory", serde_json::Value::Null);
//! let dispatcher = Dispatcher::connect(config, &registry).await?;
//!
//! dispatcher.create("users", doc! { "id": 2, "name": "Poppa joe" }).await?;
//! let users = dispatcher.find("users", Query::new()).await?;
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use bson::Document;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    backend::{Action, StoreBackend},
    config::DispatcherConfig,
    error::{StoreError, StoreResult},
    mutation::{CreateData, CreateOptions, Created, Update},
    query::{Predicate, Query},
};

/// Builds backends of one type from their JSON config block.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// The type name used in [`BackendConfig::backend_type`](crate::config::BackendConfig).
    fn backend_type(&self) -> &str;

    async fn build(&self, config: &Value) -> StoreResult<Arc<dyn StoreBackend>>;
}

/// Backend factories keyed by backend type.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        BackendRegistry::default()
    }

    /// Registers `factory` under its backend type, replacing any previous one.
    pub fn register(mut self, factory: impl BackendFactory + 'static) -> Self {
        self.factories
            .insert(factory.backend_type().to_string(), Arc::new(factory));
        self
    }

    pub fn get(&self, backend_type: &str) -> Option<&Arc<dyn BackendFactory>> {
        self.factories.get(backend_type)
    }

    /// Registered backend types, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types = self.factories.keys().map(String::as_str).collect::<Vec<_>>();
        types.sort_unstable();
        types
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("types", &self.types())
            .finish()
    }
}

/// Routes create/find/findOne/update/delete calls to the backend owning each list.
#[derive(Debug)]
pub struct Dispatcher {
    backends: BTreeMap<String, Arc<dyn StoreBackend>>,
    routes: HashMap<String, String>,
    sole: Option<String>,
}

impl Dispatcher {
    /// Builds and initializes every configured backend.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Configuration`] if the configuration is invalid or names a backend
    ///   type the registry does not know. Nothing is built in that case.
    /// * [`StoreError::Initialization`] if any backend fails to build or initialize.
    pub async fn connect(config: DispatcherConfig, registry: &BackendRegistry) -> StoreResult<Self> {
        config.validate()?;

        let factories = config
            .dbs
            .iter()
            .map(|(name, db)| match registry.get(&db.backend_type) {
                Some(factory) => Ok((name, Arc::clone(factory), &db.config)),
                None => Err(StoreError::Configuration(format!(
                    "backend '{name}' has unknown type '{}' (registered: {})",
                    db.backend_type,
                    registry.types().join(", "),
                ))),
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let built = try_join_all(factories.into_iter().map(|(name, factory, db_config)| async move {
            let backend = factory
                .build(db_config)
                .await
                .map_err(|err| StoreError::Initialization(format!("backend '{name}': {err}")))?;

            Ok::<_, StoreError>((name.clone(), backend))
        }))
        .await?;
        let backends = built.into_iter().collect::<BTreeMap<_, _>>();

        try_join_all(backends.iter().map(|(name, backend)| {
            let lists = config.lists_for(name);

            async move {
                debug!(backend = %name, lists = lists.len(), "initializing backend");

                backend
                    .init(&lists)
                    .await
                    .map_err(|err| StoreError::Initialization(format!("backend '{name}': {err}")))
            }
        }))
        .await?;

        let routes = config
            .lists
            .iter()
            .filter_map(|(list, route)| route.db.clone().map(|db| (list.clone(), db)))
            .collect::<HashMap<_, _>>();
        let sole = config.sole_backend().map(str::to_string);

        info!(backends = backends.len(), lists = config.lists.len(), "dispatcher ready");

        Ok(Dispatcher { backends, routes, sole })
    }

    /// Names of the configured backends.
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Resolves the backend owning `list`.
    pub fn backend_for(&self, list: &str) -> StoreResult<&Arc<dyn StoreBackend>> {
        let name = match &self.sole {
            Some(sole) => sole.as_str(),
            None => self
                .routes
                .get(list)
                .map(String::as_str)
                .ok_or_else(|| {
                    StoreError::Configuration(format!("list '{list}' is not routed to any backend"))
                })?,
        };

        self.backends
            .get(name)
            .ok_or_else(|| StoreError::Configuration(format!("backend '{name}' is not configured")))
    }

    fn route(&self, list: &str, action: Action) -> StoreResult<&Arc<dyn StoreBackend>> {
        let backend = self.backend_for(list)?;

        if !backend.supports(action) {
            return Err(StoreError::Configuration(
                format!("'{list}' list backend is missing the '{action}' action")
            ));
        }

        debug!(list, %action, "dispatching");

        Ok(backend)
    }

    /// Creates one or many documents in `list`, returning them.
    pub async fn create(&self, list: &str, data: impl Into<CreateData>) -> StoreResult<Created> {
        self.create_with(list, data, CreateOptions::default()).await
    }

    pub async fn create_with(
        &self,
        list: &str,
        data: impl Into<CreateData>,
        options: CreateOptions,
    ) -> StoreResult<Created> {
        self.route(list, Action::Create)?
            .create(list, data.into(), options)
            .await
    }

    pub async fn find(&self, list: &str, query: Query) -> StoreResult<Vec<Document>> {
        self.route(list, Action::Find)?
            .find(list, query)
            .await
    }

    pub async fn find_one(&self, list: &str, query: Query) -> StoreResult<Option<Document>> {
        self.route(list, Action::FindOne)?
            .find_one(list, query)
            .await
    }

    /// Merges `update.data` into every match; returns the number of documents changed.
    pub async fn update(&self, list: &str, update: Update) -> StoreResult<usize> {
        self.route(list, Action::Update)?
            .update_many(list, update)
            .await
    }

    /// Merges `update.data` into the first match only.
    pub async fn update_one(&self, list: &str, update: Update) -> StoreResult<Option<Document>> {
        self.route(list, Action::Update)?
            .update_one(list, update)
            .await
    }

    pub async fn delete(&self, list: &str, filter: Predicate) -> StoreResult<usize> {
        self.route(list, Action::Delete)?
            .delete(list, filter)
            .await
    }

    /// Closes every backend; `true` if all of them reported closed.
    pub async fn close(&self) -> StoreResult<bool> {
        let closed = try_join_all(self.backends.values().map(|backend| backend.close())).await?;

        Ok(closed.into_iter().all(|closed| closed))
    }
}
