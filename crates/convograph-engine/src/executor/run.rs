//! The sequential run loop.

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info_span, Instrument};

use super::{fanout, ExecutionEvent, Executor, ExecutorError};
use crate::graph::{CompiledGraph, Edge, END};
use crate::node_ctx::RunScope;
use crate::state::GraphState;
use crate::types::NodeError;

/// State snapshot attached to node failures.
pub(super) fn snapshot<S: Serialize>(state: &S) -> Value {
    serde_json::to_value(state).unwrap_or(Value::Null)
}

pub(super) async fn execute<S: GraphState>(
    executor: &Executor,
    graph: &CompiledGraph<S>,
    initial: S,
    scope: &RunScope,
) -> Result<S, ExecutorError> {
    let limit = executor.config().max_steps;
    let step_limit = || ExecutorError::StepLimit {
        graph: graph.name().to_string(),
        limit,
    };

    let mut state = initial;
    let mut current = graph.entry().to_string();
    let mut steps: u32 = 0;

    while current != END {
        steps += 1;
        if steps > limit {
            return Err(step_limit());
        }
        let update = run_node(executor, graph, &current, &state, scope, steps).await?;
        state.merge(update);

        current = match graph.edge(&current) {
            Some(Edge::Static(to)) => to.clone(),
            Some(Edge::Conditional { router, targets }) => {
                let to = router(&state, scope.config());
                if !targets.contains(&to) {
                    return Err(ExecutorError::InvalidRoute {
                        graph: graph.name().to_string(),
                        from: current,
                        target: to,
                    });
                }
                debug!(run_id = scope.run_id(), from = %current, to = %to, "routed");
                to
            }
            Some(Edge::FanOut {
                scatter,
                branches,
                join,
            }) => {
                let dispatches = scatter(&state, scope.config());
                if let Some(bad) = dispatches.iter().find(|d| !branches.contains(&d.target)) {
                    return Err(ExecutorError::UnknownBranch {
                        graph: graph.name().to_string(),
                        from: current,
                        target: bad.target.clone(),
                    });
                }
                let first_step = steps + 1;
                steps = steps.saturating_add(u32::try_from(dispatches.len()).unwrap_or(u32::MAX));
                if steps > limit {
                    return Err(step_limit());
                }
                let updates =
                    fanout::scatter_gather(executor, graph, &current, join, dispatches, scope, first_step)
                        .await?;
                for update in updates {
                    state.merge(update);
                }
                join.clone()
            }
            None => {
                return Err(ExecutorError::InvalidRoute {
                    graph: graph.name().to_string(),
                    from: current,
                    target: String::new(),
                })
            }
        };
    }

    debug!(run_id = scope.run_id(), graph = graph.name(), steps, "run completed");
    executor.emit(ExecutionEvent::RunCompleted {
        run_id: scope.run_id().to_string(),
        graph: graph.name().to_string(),
        steps,
    });
    Ok(state)
}

async fn run_node<S: GraphState>(
    executor: &Executor,
    graph: &CompiledGraph<S>,
    node: &str,
    state: &S,
    scope: &RunScope,
    step: u32,
) -> Result<S::Update, ExecutorError> {
    let failed = |source: NodeError| ExecutorError::NodeFailed {
        graph: graph.name().to_string(),
        node: node.to_string(),
        snapshot: snapshot(state),
        source,
    };
    let handler = graph
        .handler(node)
        .ok_or_else(|| failed(NodeError::fatal(format!("no handler for node {node}"))))?;

    executor.emit(ExecutionEvent::NodeStarted {
        run_id: scope.run_id().to_string(),
        node: node.to_string(),
        step,
    });
    let started = Instant::now();
    let ctx = scope.node_ctx(node);
    let span = info_span!("node", run_id = scope.run_id(), node);
    let update = handler.run(state, &ctx).instrument(span).await.map_err(failed)?;

    executor.emit(ExecutionEvent::NodeCompleted {
        run_id: scope.run_id().to_string(),
        node: node.to_string(),
        step,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    });
    Ok(update)
}
