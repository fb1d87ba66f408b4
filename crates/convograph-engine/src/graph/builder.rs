use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::{CompiledGraph, Dispatch, Edge, GraphError, END};
use crate::config::RunConfig;
use crate::state::GraphState;
use crate::traits::NodeHandler;

/// Fluent builder for [`CompiledGraph`].
///
/// Problems are collected while building and reported together by
/// [`compile`](Self::compile).
pub struct GraphBuilder<S: GraphState> {
    name: String,
    entry: Option<String>,
    nodes: HashMap<String, Arc<dyn NodeHandler<S>>>,
    edges: Vec<(String, Edge<S>)>,
    problems: Vec<String>,
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            nodes: HashMap::new(),
            edges: Vec::new(),
            problems: Vec::new(),
        }
    }

    pub fn add_node(self, name: impl Into<String>, handler: impl NodeHandler<S> + 'static) -> Self {
        self.add_node_arc(name, Arc::new(handler))
    }

    pub fn add_node_arc(mut self, name: impl Into<String>, handler: Arc<dyn NodeHandler<S>>) -> Self {
        let name = name.into();
        if name == END {
            self.problems.push(format!("Node name {END} is reserved"));
        } else if self.nodes.insert(name.clone(), handler).is_some() {
            self.problems.push(format!("Duplicate node: {name}"));
        }
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Unconditional edge. `to` may be [`END`].
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), Edge::Static(to.into())));
        self
    }

    /// Edge whose target is chosen by `router` from `targets` at run time.
    pub fn add_conditional_edges<F, T>(mut self, from: impl Into<String>, router: F, targets: &[&str]) -> Self
    where
        F: Fn(&S, &RunConfig) -> T + Send + Sync + 'static,
        T: Into<String>,
    {
        self.edges.push((
            from.into(),
            Edge::Conditional {
                router: Arc::new(move |state, config| router(state, config).into()),
                targets: targets.iter().map(|t| t.to_string()).collect(),
            },
        ));
        self
    }

    /// Fan-out edge: `scatter` dispatches to any of `branches` in parallel,
    /// then control continues at `join`. An empty dispatch list goes straight
    /// to `join`.
    pub fn add_fan_out<F>(
        mut self,
        from: impl Into<String>,
        scatter: F,
        branches: &[&str],
        join: impl Into<String>,
    ) -> Self
    where
        F: Fn(&S, &RunConfig) -> Vec<Dispatch<S>> + Send + Sync + 'static,
    {
        self.edges.push((
            from.into(),
            Edge::FanOut {
                scatter: Arc::new(scatter),
                branches: branches.iter().map(|b| b.to_string()).collect(),
                join: join.into(),
            },
        ));
        self
    }

    /// Validate and freeze the graph.
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        let mut problems = self.problems;

        let branches: HashSet<String> = self
            .edges
            .iter()
            .filter_map(|(_, edge)| match edge {
                Edge::FanOut { branches, .. } => Some(branches.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();

        let known = |name: &str| self.nodes.contains_key(name);
        let routable = |name: &str| name == END || (known(name) && !branches.contains(name));

        // 1. Entry point.
        match &self.entry {
            None => problems.push("No entry node set".to_string()),
            Some(entry) if !known(entry) => problems.push(format!("Unknown entry node: {entry}")),
            Some(entry) if branches.contains(entry) => {
                problems.push(format!("Entry node {entry} is a fan-out branch"))
            }
            Some(_) => {}
        }

        // 2. One outgoing edge per node, from a known node to valid targets.
        let mut edges: HashMap<String, Edge<S>> = HashMap::new();
        for (from, edge) in self.edges {
            if !known(&from) {
                problems.push(format!("Edge from unknown node: {from}"));
            }
            if branches.contains(&from) {
                problems.push(format!("Fan-out branch {from} must not have outgoing edges"));
            }
            match &edge {
                Edge::Static(to) => {
                    if !routable(to) {
                        problems.push(format!("Edge {from} -> {to} targets an unknown or branch node"));
                    }
                }
                Edge::Conditional { targets, .. } => {
                    if targets.is_empty() {
                        problems.push(format!("Conditional edge from {from} declares no targets"));
                    }
                    for to in targets {
                        if !routable(to) {
                            problems.push(format!(
                                "Conditional edge {from} -> {to} targets an unknown or branch node"
                            ));
                        }
                    }
                }
                Edge::FanOut { branches: declared, join, .. } => {
                    if declared.is_empty() {
                        problems.push(format!("Fan-out from {from} declares no branches"));
                    }
                    for branch in declared {
                        if !known(branch) {
                            problems.push(format!("Fan-out from {from} to unknown branch: {branch}"));
                        }
                    }
                    if !routable(join) {
                        problems.push(format!("Fan-out from {from} joins at unknown or branch node: {join}"));
                    }
                }
            }
            if edges.insert(from.clone(), edge).is_some() {
                problems.push(format!("Node {from} has more than one outgoing edge"));
            }
        }

        // 3. Every non-branch node needs somewhere to go.
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        for name in &names {
            if !branches.contains(*name) && !edges.contains_key(*name) {
                problems.push(format!("Node {name} has no outgoing edge"));
            }
        }

        // 4. Every node is reachable from the entry.
        if let Some(entry) = self.entry.as_deref().filter(|e| known(e)) {
            let mut seen: HashSet<&str> = HashSet::from([entry]);
            let mut queue = VecDeque::from([entry]);
            while let Some(node) = queue.pop_front() {
                let next: Vec<&str> = match edges.get(node) {
                    Some(Edge::Static(to)) => vec![to.as_str()],
                    Some(Edge::Conditional { targets, .. }) => targets.iter().map(String::as_str).collect(),
                    Some(Edge::FanOut { branches, join, .. }) => branches
                        .iter()
                        .map(String::as_str)
                        .chain(std::iter::once(join.as_str()))
                        .collect(),
                    None => Vec::new(),
                };
                for to in next {
                    if to != END && known(to) && seen.insert(to) {
                        queue.push_back(to);
                    }
                }
            }
            for name in &names {
                if !seen.contains(name.as_str()) {
                    problems.push(format!("Node {name} is unreachable from entry {entry}"));
                }
            }
        }

        if !problems.is_empty() {
            return Err(GraphError {
                graph: self.name,
                problems,
            });
        }

        Ok(CompiledGraph {
            name: self.name,
            entry: self.entry.unwrap_or_default(),
            nodes: self.nodes,
            edges,
            branches,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_ctx::NodeCtx;
    use crate::traits::FnNode;
    use crate::types::NodeError;

    crate::graph_state! {
        struct Trace => TraceUpdate {
            append visited: String,
        }
    }

    fn noop() -> FnNode<impl Fn(&Trace, &NodeCtx) -> Result<TraceUpdate, NodeError> + Send + Sync> {
        FnNode(|_: &Trace, _: &NodeCtx| Ok(TraceUpdate::default()))
    }

    #[test]
    fn linear_graph_compiles() {
        let graph = GraphBuilder::<Trace>::new("linear")
            .add_node("a", noop())
            .add_node("b", noop())
            .set_entry("a")
            .add_edge("a", "b")
            .add_edge("b", END)
            .compile()
            .unwrap();
        assert_eq!(graph.entry(), "a");
        assert_eq!(graph.node_names(), ["a", "b"]);
    }

    #[test]
    fn reports_all_problems() {
        let err = GraphBuilder::<Trace>::new("broken")
            .add_node("a", noop())
            .add_node("a", noop())
            .add_node("orphan", noop())
            .set_entry("start")
            .add_edge("a", "missing")
            .compile()
            .err()
            .unwrap();
        let text = err.problems.join("\n");
        assert!(text.contains("Duplicate node: a"));
        assert!(text.contains("Unknown entry node: start"));
        assert!(text.contains("a -> missing"));
        assert!(text.contains("Node orphan has no outgoing edge"));
        assert!(err.to_string().starts_with("invalid graph 'broken'"));
    }

    #[test]
    fn branch_nodes_cannot_have_edges_or_be_routed_to() {
        let err = GraphBuilder::<Trace>::new("fan")
            .add_node("start", noop())
            .add_node("worker", noop())
            .add_node("join", noop())
            .set_entry("start")
            .add_fan_out("start", |_, _| Vec::new(), &["worker"], "join")
            .add_edge("worker", "join")
            .add_conditional_edges("join", |_, _| END, &["worker", END])
            .compile()
            .err()
            .unwrap();
        let text = err.problems.join("\n");
        assert!(text.contains("Fan-out branch worker must not have outgoing edges"));
        assert!(text.contains("join -> worker"));
    }

    #[test]
    fn unreachable_node_is_rejected() {
        let err = GraphBuilder::<Trace>::new("island")
            .add_node("a", noop())
            .add_node("island", noop())
            .set_entry("a")
            .add_edge("a", END)
            .add_edge("island", END)
            .compile()
            .err()
            .unwrap();
        assert_eq!(err.problems, ["Node island is unreachable from entry a"]);
    }

    #[test]
    fn second_outgoing_edge_is_rejected() {
        let err = GraphBuilder::<Trace>::new("dup")
            .add_node("a", noop())
            .set_entry("a")
            .add_edge("a", END)
            .add_edge("a", END)
            .compile()
            .err()
            .unwrap();
        assert_eq!(err.problems, ["Node a has more than one outgoing edge"]);
    }
}
