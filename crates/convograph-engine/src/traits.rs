//! Async trait interfaces for nodes and external collaborators.
//!
//! Models, capabilities, web access, and long-term memory are all reached
//! through these traits. Reference implementations live in
//! [`defaults`](crate::defaults).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::*;
use crate::node_ctx::NodeCtx;
use crate::state::GraphState;
use crate::types::*;

// ---------------------------------------------------------------------------
// NodeHandler
// ---------------------------------------------------------------------------

/// A unit of work in a graph over state `S`.
///
/// `run` reads the current state and returns a partial update; the executor
/// merges it according to the state's field policies.
#[async_trait]
pub trait NodeHandler<S: GraphState>: Send + Sync {
    async fn run(&self, state: &S, ctx: &NodeCtx) -> Result<S::Update, NodeError>;
}

/// Adapts a synchronous closure into a [`NodeHandler`].
pub struct FnNode<F>(pub F);

#[async_trait]
impl<S, F> NodeHandler<S> for FnNode<F>
where
    S: GraphState,
    F: Fn(&S, &NodeCtx) -> Result<S::Update, NodeError> + Send + Sync,
{
    async fn run(&self, state: &S, ctx: &NodeCtx) -> Result<S::Update, NodeError> {
        (self.0)(state, ctx)
    }
}

// ---------------------------------------------------------------------------
// ChatModel / ModelFactory
// ---------------------------------------------------------------------------

/// A chat model instance bound to one name and temperature.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce the next assistant message for `request`.
    async fn invoke(&self, request: ModelRequest) -> Result<Message, GatewayError>;

    /// Model name for diagnostics.
    fn name(&self) -> &str;
}

/// Creates [`ChatModel`] instances for the
/// [`ModelGateway`](crate::gateway::ModelGateway).
pub trait ModelFactory: Send + Sync {
    /// Build a model for `model` at `temperature`. Unknown names must fail
    /// with [`GatewayError::UnsupportedModel`].
    fn create(
        &self,
        model: &str,
        temperature: f32,
    ) -> Result<std::sync::Arc<dyn ChatModel>, GatewayError>;
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A named operation a model may ask the assistant to perform.
#[async_trait]
pub trait Capability: Send + Sync {
    fn spec(&self) -> CapabilitySpec;

    async fn call(&self, arguments: Value) -> Result<String, CapabilityError>;
}

/// The set of capabilities offered to models during a run.
///
/// Failures are returned as errors; callers turn them into textual tool
/// results so they never end a run.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    fn list(&self) -> Vec<CapabilitySpec>;

    async fn invoke(&self, name: &str, arguments: Value) -> Result<String, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Web access
// ---------------------------------------------------------------------------

/// Web search provider.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Up to `limit` hits for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CapabilityError>;
}

/// Page fetcher. Never fails: problems are reported as the returned text.
#[async_trait]
pub trait WebFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> String;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Namespaced long-term memory.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Up to `limit` items in `namespace` ranked by relevance to `query`.
    async fn search(
        &self,
        namespace: &Namespace,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, StoreError>;

    /// Store `value` under `key`, replacing any previous value for the key.
    async fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<(), StoreError>;
}
