//! Sub-graph composition.
//!
//! A [`Subgraph`] embeds a compiled graph over a child state `C` as a single
//! node of a parent graph over state `P`. When the node runs:
//!
//! 1. the input mapping builds the child's initial state from the parent
//!    state,
//! 2. the child graph runs as a nested run (run id `{parent}/{node}`), with
//!    the parent's executor, config, and store unless overridden,
//! 3. the output mapping turns the child's final state into a parent update.
//!
//! A failing child run fails the node with [`NodeError::Subgraph`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::RunConfig;
use crate::executor::Executor;
use crate::graph::CompiledGraph;
use crate::node_ctx::NodeCtx;
use crate::state::GraphState;
use crate::traits::{MemoryStore, NodeHandler};
use crate::types::NodeError;

/// Which memory store a nested run sees.
#[derive(Clone, Default)]
pub enum StoreBinding {
    /// The parent run's store.
    #[default]
    Inherit,
    /// A fixed store, regardless of the parent.
    Fixed(Arc<dyn MemoryStore>),
}

type InputMap<P, C> = Box<dyn Fn(&P, &RunConfig) -> C + Send + Sync>;
type OutputMap<P, C> = Box<dyn Fn(&P, C) -> <P as GraphState>::Update + Send + Sync>;
type ConfigMap<P> = Box<dyn Fn(&P, &RunConfig) -> RunConfig + Send + Sync>;

/// Node that runs a child graph.
pub struct Subgraph<P: GraphState, C: GraphState> {
    graph: Arc<CompiledGraph<C>>,
    executor: Option<Executor>,
    store: StoreBinding,
    input: InputMap<P, C>,
    output: OutputMap<P, C>,
    config: Option<ConfigMap<P>>,
}

impl<P: GraphState, C: GraphState> Subgraph<P, C> {
    pub fn new<I, O>(graph: Arc<CompiledGraph<C>>, input: I, output: O) -> Self
    where
        I: Fn(&P, &RunConfig) -> C + Send + Sync + 'static,
        O: Fn(&P, C) -> P::Update + Send + Sync + 'static,
    {
        Self {
            graph,
            executor: None,
            store: StoreBinding::Inherit,
            input: Box::new(input),
            output: Box::new(output),
            config: None,
        }
    }

    pub fn with_store(mut self, store: StoreBinding) -> Self {
        self.store = store;
        self
    }

    /// Run the child on `executor` instead of the parent's.
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Derive the nested run's config from the parent state and config.
    pub fn with_config<F>(mut self, config: F) -> Self
    where
        F: Fn(&P, &RunConfig) -> RunConfig + Send + Sync + 'static,
    {
        self.config = Some(Box::new(config));
        self
    }
}

#[async_trait]
impl<P: GraphState, C: GraphState> NodeHandler<P> for Subgraph<P, C> {
    async fn run(&self, state: &P, ctx: &NodeCtx) -> Result<P::Update, NodeError> {
        let mut scope = ctx.scope().child(ctx.node());
        if let Some(derive) = &self.config {
            scope = scope.with_config(Arc::new(derive(state, ctx.config())));
        }
        if let StoreBinding::Fixed(store) = &self.store {
            scope = scope.with_store(Arc::clone(store));
        }

        let input = (self.input)(state, scope.config());
        debug!(run_id = scope.run_id(), graph = self.graph.name(), "starting nested run");
        let executor = self.executor.as_ref().unwrap_or_else(|| scope.executor());
        let result = executor
            .run(&*self.graph, input, &scope)
            .await
            .map_err(|e| NodeError::Subgraph {
                graph: self.graph.name().to_string(),
                source: Box::new(e),
            })?;
        Ok((self.output)(state, result))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
