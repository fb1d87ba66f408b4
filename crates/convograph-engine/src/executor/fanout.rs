//! Fan-out / fan-in: parallel branch execution with ordered merging.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info_span, Instrument};

use super::run::snapshot;
use super::{ExecutionEvent, Executor, ExecutorError};
use crate::graph::{CompiledGraph, Dispatch};
use crate::node_ctx::RunScope;
use crate::state::GraphState;
use crate::types::NodeError;

/// Run every dispatch as its own task and collect the updates in dispatch
/// order.
///
/// All branches run to completion. If any failed, the failure of the branch
/// with the lowest dispatch index is returned.
pub(super) async fn scatter_gather<S: GraphState>(
    executor: &Executor,
    graph: &CompiledGraph<S>,
    from: &str,
    join: &str,
    dispatches: Vec<Dispatch<S>>,
    scope: &RunScope,
    first_step: u32,
) -> Result<Vec<S::Update>, ExecutorError> {
    let expected = dispatches.len();
    executor.emit(ExecutionEvent::FanOutDispatched {
        run_id: scope.run_id().to_string(),
        from: from.to_string(),
        targets: dispatches.iter().map(|d| d.target.clone()).collect(),
    });

    let mut running = FuturesUnordered::new();
    for (index, dispatch) in dispatches.into_iter().enumerate() {
        let node = dispatch.target;
        let handler = graph.handler(&node).map(Arc::clone).ok_or_else(|| {
            ExecutorError::UnknownBranch {
                graph: graph.name().to_string(),
                from: from.to_string(),
                target: node.clone(),
            }
        })?;
        let ctx = scope.node_ctx(&node);
        let events = executor.clone();
        let input = dispatch.input;
        let step = first_step.saturating_add(u32::try_from(index).unwrap_or(u32::MAX));
        let span = info_span!("node", run_id = scope.run_id(), node = %node, branch = index);

        let task = tokio::spawn(
            async move {
                events.emit(ExecutionEvent::NodeStarted {
                    run_id: ctx.run_id().to_string(),
                    node: ctx.node().to_string(),
                    step,
                });
                let started = Instant::now();
                let outcome = handler.run(&input, &ctx).await;
                if outcome.is_ok() {
                    events.emit(ExecutionEvent::NodeCompleted {
                        run_id: ctx.run_id().to_string(),
                        node: ctx.node().to_string(),
                        step,
                        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    });
                }
                outcome.map_err(|e| (e, snapshot(&input)))
            }
            .instrument(span),
        );
        running.push(async move { (index, node, task.await) });
    }

    let mut results: Vec<Option<S::Update>> = (0..expected).map(|_| None).collect();
    let mut failure: Option<(usize, ExecutorError)> = None;
    while let Some((index, node, joined)) = running.next().await {
        let error = match joined {
            Ok(Ok(update)) => {
                results[index] = Some(update);
                continue;
            }
            Ok(Err((source, snapshot))) => branch_failed(graph, node, snapshot, source),
            Err(join_error) => ExecutorError::BranchPanicked {
                graph: graph.name().to_string(),
                node,
                message: join_error.to_string(),
            },
        };
        if failure.as_ref().map_or(true, |(lowest, _)| index < *lowest) {
            failure = Some((index, error));
        }
    }
    if let Some((_, error)) = failure {
        return Err(error);
    }

    debug!(run_id = scope.run_id(), from, join, branches = expected, "fan-in complete");
    executor.emit(ExecutionEvent::FanOutJoined {
        run_id: scope.run_id().to_string(),
        from: from.to_string(),
        join: join.to_string(),
        branches: expected,
    });
    Ok(results.into_iter().flatten().collect())
}

fn branch_failed<S: GraphState>(
    graph: &CompiledGraph<S>,
    node: String,
    snapshot: serde_json::Value,
    source: NodeError,
) -> ExecutorError {
    ExecutorError::NodeFailed {
        graph: graph.name().to_string(),
        node,
        snapshot,
        source,
    }
}
