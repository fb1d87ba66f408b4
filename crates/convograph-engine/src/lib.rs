//! Convograph: a conversational assistant built on a typed graph engine.
//!
//! The engine runs graphs of async nodes over a typed state whose fields
//! merge by declared policy (overwrite or append). Graphs support
//! conditional routing, parallel fan-out with order-stable fan-in, and
//! nesting one graph inside another as a single node.
//!
//! On top of the engine, [`flows`] defines the assistant: query processing
//! with a bounded decision loop, parallel knowledge collection from web
//! research and long-term memory, and a final answer that may call
//! capabilities. [`Assistant`] runs it one user turn at a time.
//!
//! Models, capabilities, web access, and memory are reached through the
//! traits in [`traits`]; [`defaults`] has in-process implementations.

pub mod assistant;
pub mod config;
pub mod defaults;
pub mod errors;
pub mod executor;
pub mod flows;
pub mod gateway;
pub mod graph;
pub mod node_ctx;
pub mod prompts;
pub mod state;
pub mod subgraph;
pub mod tool_loop;
pub mod tool_registry;
pub mod traits;
pub mod types;

// Re-export public types at the crate level.

// assistant
pub use assistant::{Assistant, AssistantError, APOLOGY};

// config
pub use config::{MemoryConfig, ResearchConfig, RunConfig};

// defaults
pub use defaults::{
    HttpFetcher, InMemoryStore, NoopWebSearch, ScriptedFactory, ScriptedModel, StaticWebFetch,
    StaticWebSearch,
};

// errors
pub use errors::{CapabilityError, ConfigError, GatewayError, StoreError};

// executor
pub use executor::{ExecutionEvent, Executor, ExecutorConfig, ExecutorError};

// gateway
pub use gateway::ModelGateway;

// graph
pub use graph::{CompiledGraph, Dispatch, GraphBuilder, GraphError, END};

// node_ctx
#[cfg(any(test, feature = "test-support"))]
pub use node_ctx::test_support::TestNodeCtx;
pub use node_ctx::{NodeCtx, RunScope, Services};

// state
pub use state::{FieldSpec, GraphState, MergePolicy};

// subgraph
pub use subgraph::{StoreBinding, Subgraph};

// tool loop / registry
pub use tool_loop::{ToolCallLoop, ToolLoopOutcome};
pub use tool_registry::ToolRegistry;

// traits
pub use traits::{
    Capability, CapabilityRegistry, ChatModel, FnNode, MemoryStore, ModelFactory, NodeHandler,
    WebFetch, WebSearch,
};

// types
pub use types::{Message, NodeError, Role, ToolCall};
