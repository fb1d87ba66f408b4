//! Graph executor.
//!
//! Runs a [`CompiledGraph`] from its entry node until a node routes to
//! [`END`](crate::graph::END). Sequential nodes run inline; fan-out branches
//! run as parallel tokio tasks whose updates are merged in dispatch order,
//! so the final state does not depend on completion order.
//!
//! A run fails on the first node error, an undeclared route, or when it
//! exceeds [`ExecutorConfig::max_steps`] node executions.

mod fanout;
mod run;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::graph::CompiledGraph;
use crate::node_ctx::RunScope;
use crate::state::GraphState;
use crate::types::NodeError;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Errors from the executor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// A node returned an error. `snapshot` is the state it was given.
    #[error("node '{node}' in graph '{graph}' failed: {source}")]
    NodeFailed {
        graph: String,
        node: String,
        snapshot: Value,
        #[source]
        source: NodeError,
    },
    /// A router chose a target outside its declared set.
    #[error("router after '{from}' in graph '{graph}' chose undeclared target '{target}'")]
    InvalidRoute {
        graph: String,
        from: String,
        target: String,
    },
    /// A scatter function dispatched to a node that is not a declared branch.
    #[error("fan-out after '{from}' in graph '{graph}' dispatched to undeclared branch '{target}'")]
    UnknownBranch {
        graph: String,
        from: String,
        target: String,
    },
    #[error("graph '{graph}' exceeded the limit of {limit} node executions")]
    StepLimit { graph: String, limit: u32 },
    #[error("branch '{node}' in graph '{graph}' panicked: {message}")]
    BranchPanicked {
        graph: String,
        node: String,
        message: String,
    },
}

impl ExecutorError {
    /// The node error behind this failure, if a node failed.
    pub fn node_error(&self) -> Option<&NodeError> {
        match self {
            Self::NodeFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Name of the failing node, if a node failed.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::NodeFailed { node, .. } | Self::BranchPanicked { node, .. } => Some(node.as_str()),
            _ => None,
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        self.node_error().is_some_and(NodeError::is_contract_violation)
    }

    pub fn is_configuration(&self) -> bool {
        self.node_error().is_some_and(NodeError::is_configuration)
    }
}

/// Configuration for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum node executions per run, branches included. Default: 100.
    pub max_steps: u32,
    /// Capacity of the live event channel. Default: 256.
    pub event_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            event_capacity: 256,
        }
    }
}

/// Live progress of a run, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: String,
        graph: String,
    },
    NodeStarted {
        run_id: String,
        node: String,
        step: u32,
    },
    NodeCompleted {
        run_id: String,
        node: String,
        step: u32,
        duration_ms: u64,
    },
    FanOutDispatched {
        run_id: String,
        from: String,
        targets: Vec<String>,
    },
    FanOutJoined {
        run_id: String,
        from: String,
        join: String,
        branches: usize,
    },
    RunCompleted {
        run_id: String,
        graph: String,
        steps: u32,
    },
    RunFailed {
        run_id: String,
        graph: String,
        error: String,
    },
}

/// Runs compiled graphs. Cheap to clone; clones share the event channel.
#[derive(Clone)]
pub struct Executor {
    config: ExecutorConfig,
    events: broadcast::Sender<ExecutionEvent>,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self { config, events }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Receive events of every run started after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Run `graph` to completion from `initial` and return the final state.
    ///
    /// Nodes see this executor in their scope, so nested runs share its
    /// limits and event channel.
    pub async fn run<S: GraphState>(
        &self,
        graph: &CompiledGraph<S>,
        initial: S,
        scope: &RunScope,
    ) -> Result<S, ExecutorError> {
        self.emit(ExecutionEvent::RunStarted {
            run_id: scope.run_id().to_string(),
            graph: graph.name().to_string(),
        });
        let scope = scope.clone().with_executor(self.clone());
        let result = run::execute(self, graph, initial, &scope).await;
        if let Err(e) = &result {
            tracing::error!(run_id = scope.run_id(), graph = graph.name(), error = %e, "run failed");
            self.emit(ExecutionEvent::RunFailed {
                run_id: scope.run_id().to_string(),
                graph: graph.name().to_string(),
                error: e.to_string(),
            });
        }
        result
    }

    pub(crate) fn emit(&self, event: ExecutionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests;
