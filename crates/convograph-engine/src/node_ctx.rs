//! Runtime context given to every node invocation.
//!
//! A run is described by a [`RunScope`]: its id, its [`RunConfig`], the
//! [`Services`] it talks to, and the [`Executor`] running it. The executor derives a [`NodeCtx`] from the scope
//! for each node it runs; node code never builds one directly outside tests.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::RunConfig;
use crate::defaults::{HttpFetcher, InMemoryStore, NoopWebSearch};
use crate::executor::Executor;
use crate::gateway::ModelGateway;
use crate::tool_registry::ToolRegistry;
use crate::traits::{CapabilityRegistry, MemoryStore, WebFetch, WebSearch};

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// External collaborators of a run. Cheap to clone.
#[derive(Clone)]
pub struct Services {
    pub models: Arc<ModelGateway>,
    pub capabilities: Arc<dyn CapabilityRegistry>,
    pub store: Arc<dyn MemoryStore>,
    pub web_search: Arc<dyn WebSearch>,
    pub web_fetch: Arc<dyn WebFetch>,
}

impl Services {
    pub fn builder(models: Arc<ModelGateway>) -> ServicesBuilder {
        ServicesBuilder {
            models,
            capabilities: None,
            store: None,
            web_search: None,
            web_fetch: None,
        }
    }

    /// Same services with a different memory store.
    pub fn with_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = store;
        self
    }
}

/// Fluent builder for [`Services`]. Unset collaborators get the in-process
/// defaults: no capabilities, an empty [`InMemoryStore`], no web search, and
/// an [`HttpFetcher`].
pub struct ServicesBuilder {
    models: Arc<ModelGateway>,
    capabilities: Option<Arc<dyn CapabilityRegistry>>,
    store: Option<Arc<dyn MemoryStore>>,
    web_search: Option<Arc<dyn WebSearch>>,
    web_fetch: Option<Arc<dyn WebFetch>>,
}

impl ServicesBuilder {
    pub fn capabilities(mut self, registry: Arc<dyn CapabilityRegistry>) -> Self {
        self.capabilities = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn web_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(search);
        self
    }

    pub fn web_fetch(mut self, fetch: Arc<dyn WebFetch>) -> Self {
        self.web_fetch = Some(fetch);
        self
    }

    pub fn build(self) -> Services {
        Services {
            models: self.models,
            capabilities: self
                .capabilities
                .unwrap_or_else(|| Arc::new(ToolRegistry::new())),
            store: self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new())),
            web_search: self.web_search.unwrap_or_else(|| Arc::new(NoopWebSearch)),
            web_fetch: self
                .web_fetch
                .unwrap_or_else(|| Arc::new(HttpFetcher::with_client(reqwest::Client::new()))),
        }
    }
}

// ---------------------------------------------------------------------------
// RunScope
// ---------------------------------------------------------------------------

/// Identity, configuration, and services of one graph run.
#[derive(Clone)]
pub struct RunScope {
    run_id: String,
    config: Arc<RunConfig>,
    services: Services,
    executor: Executor,
}

impl RunScope {
    /// New scope with a random run id.
    pub fn new(config: Arc<RunConfig>, services: Services) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            config,
            services,
            executor: Executor::default(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_config(mut self, config: Arc<RunConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.services.store = store;
        self
    }

    /// Executor for nested runs. [`Executor::run`] sets itself here.
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Scope for a nested run started from `node`.
    pub fn child(&self, node: &str) -> Self {
        Self {
            run_id: format!("{}/{node}", self.run_id),
            config: Arc::clone(&self.config),
            services: self.services.clone(),
            executor: self.executor.clone(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub(crate) fn node_ctx(&self, node: &str) -> NodeCtx {
        NodeCtx {
            scope: self.clone(),
            node: node.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeCtx
// ---------------------------------------------------------------------------

/// The runtime context given to every node invocation.
#[derive(Clone)]
pub struct NodeCtx {
    scope: RunScope,
    node: String,
}

impl NodeCtx {
    pub fn run_id(&self) -> &str {
        self.scope.run_id()
    }

    /// Name of the node being run.
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn config(&self) -> &RunConfig {
        self.scope.config()
    }

    pub fn scope(&self) -> &RunScope {
        &self.scope
    }

    pub fn models(&self) -> &ModelGateway {
        &self.scope.services.models
    }

    pub fn capabilities(&self) -> &dyn CapabilityRegistry {
        self.scope.services.capabilities.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.scope.services.store
    }

    pub fn web_search(&self) -> &dyn WebSearch {
        self.scope.services.web_search.as_ref()
    }

    pub fn web_fetch(&self) -> &dyn WebFetch {
        self.scope.services.web_fetch.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    //! Builder for [`NodeCtx`] instances in unit tests.

    use super::*;
    use crate::defaults::ScriptedFactory;
    use crate::traits::{ChatModel, ModelFactory};

    /// Builds a [`NodeCtx`] without running a graph.
    pub struct TestNodeCtx;

    impl TestNodeCtx {
        pub fn builder() -> TestNodeCtxBuilder {
            TestNodeCtxBuilder {
                run_id: "test-run".into(),
                node: "test-node".into(),
                config: RunConfig::default(),
                factory: ScriptedFactory::new(),
                custom_factory: None,
                capabilities: None,
                store: None,
                web_search: None,
                web_fetch: None,
            }
        }
    }

    pub struct TestNodeCtxBuilder {
        run_id: String,
        node: String,
        config: RunConfig,
        factory: ScriptedFactory,
        custom_factory: Option<Arc<dyn ModelFactory>>,
        capabilities: Option<Arc<dyn CapabilityRegistry>>,
        store: Option<Arc<dyn MemoryStore>>,
        web_search: Option<Arc<dyn WebSearch>>,
        web_fetch: Option<Arc<dyn WebFetch>>,
    }

    impl TestNodeCtxBuilder {
        pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
            self.run_id = run_id.into();
            self
        }

        pub fn node(mut self, node: impl Into<String>) -> Self {
            self.node = node.into();
            self
        }

        pub fn config(mut self, config: RunConfig) -> Self {
            self.config = config;
            self
        }

        /// Register a model under `name` with the scripted factory.
        pub fn model(mut self, name: impl Into<String>, model: Arc<dyn ChatModel>) -> Self {
            self.factory = self.factory.with_model(name, model);
            self
        }

        /// Replace the scripted factory entirely.
        pub fn model_factory(mut self, factory: Arc<dyn ModelFactory>) -> Self {
            self.custom_factory = Some(factory);
            self
        }

        pub fn capabilities(mut self, registry: Arc<dyn CapabilityRegistry>) -> Self {
            self.capabilities = Some(registry);
            self
        }

        pub fn store(mut self, store: Arc<dyn MemoryStore>) -> Self {
            self.store = Some(store);
            self
        }

        pub fn web_search(mut self, search: Arc<dyn WebSearch>) -> Self {
            self.web_search = Some(search);
            self
        }

        pub fn web_fetch(mut self, fetch: Arc<dyn WebFetch>) -> Self {
            self.web_fetch = Some(fetch);
            self
        }

        pub fn build(self) -> NodeCtx {
            let factory = self
                .custom_factory
                .unwrap_or_else(|| Arc::new(self.factory));
            let mut services = Services::builder(Arc::new(ModelGateway::new(factory)));
            if let Some(registry) = self.capabilities {
                services = services.capabilities(registry);
            }
            if let Some(store) = self.store {
                services = services.store(store);
            }
            if let Some(search) = self.web_search {
                services = services.web_search(search);
            }
            if let Some(fetch) = self.web_fetch {
                services = services.web_fetch(fetch);
            }
            RunScope::new(Arc::new(self.config), services.build())
                .with_run_id(self.run_id)
                .node_ctx(&self.node)
        }
    }
}
