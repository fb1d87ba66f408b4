//! Graph definitions: nodes, edges, and compiled graphs.
//!
//! A graph is built with [`GraphBuilder`] and frozen by
//! [`GraphBuilder::compile`], which validates its structure. A
//! [`CompiledGraph`] is immutable and can be shared across runs.
//!
//! Each node has exactly one outgoing edge:
//! - a static edge to a fixed target,
//! - a conditional edge whose router picks one of a declared set of targets,
//! - or a fan-out edge whose scatter function produces one [`Dispatch`] per
//!   parallel branch; branch updates are merged and control continues at the
//!   join node.
//!
//! Branch nodes are run only through fan-outs and have no edges of their own.

mod builder;

pub use builder::GraphBuilder;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::config::RunConfig;
use crate::state::GraphState;
use crate::traits::NodeHandler;

/// Target name that ends the run.
pub const END: &str = "__end__";

/// Picks the next node from the state after a node's update is merged.
pub type RouterFn<S> = Arc<dyn Fn(&S, &RunConfig) -> String + Send + Sync>;

/// Produces the branch dispatches of a fan-out.
pub type ScatterFn<S> = Arc<dyn Fn(&S, &RunConfig) -> Vec<Dispatch<S>> + Send + Sync>;

/// One parallel branch invocation: a branch node and its own input state.
#[derive(Debug, Clone)]
pub struct Dispatch<S> {
    pub target: String,
    pub input: S,
}

impl<S> Dispatch<S> {
    pub fn new(target: impl Into<String>, input: S) -> Self {
        Self {
            target: target.into(),
            input,
        }
    }
}

pub(crate) enum Edge<S> {
    Static(String),
    Conditional {
        router: RouterFn<S>,
        targets: Vec<String>,
    },
    FanOut {
        scatter: ScatterFn<S>,
        branches: Vec<String>,
        join: String,
    },
}

/// Errors from graph compilation. Lists every problem found.
#[derive(Debug, Error)]
#[error("invalid graph '{graph}': {}", problems.join("; "))]
pub struct GraphError {
    pub graph: String,
    pub problems: Vec<String>,
}

/// A validated, immutable graph over state `S`.
pub struct CompiledGraph<S: GraphState> {
    name: String,
    entry: String,
    nodes: HashMap<String, Arc<dyn NodeHandler<S>>>,
    edges: HashMap<String, Edge<S>>,
    branches: HashSet<String>,
}

impl<S: GraphState> CompiledGraph<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Whether `node` runs only as a fan-out branch.
    pub fn is_branch(&self, node: &str) -> bool {
        self.branches.contains(node)
    }

    /// Node names, sorted.
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn handler(&self, node: &str) -> Option<&Arc<dyn NodeHandler<S>>> {
        self.nodes.get(node)
    }

    pub(crate) fn edge(&self, node: &str) -> Option<&Edge<S>> {
        self.edges.get(node)
    }
}
