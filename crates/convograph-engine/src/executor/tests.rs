use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::TryRecvError;

use super::*;
use crate::config::RunConfig;
use crate::defaults::ScriptedFactory;
use crate::gateway::ModelGateway;
use crate::graph::{Dispatch, GraphBuilder, END};
use crate::node_ctx::{NodeCtx, Services};
use crate::traits::{FnNode, NodeHandler};

crate::graph_state! {
    struct Trace => TraceUpdate {
        overwrite counter: u32,
        overwrite item: String,
        overwrite delay_ms: u64,
        append visited: String,
    }
}

/// Records its name and bumps the counter.
struct Visit(&'static str);

#[async_trait]
impl NodeHandler<Trace> for Visit {
    async fn run(&self, state: &Trace, _ctx: &NodeCtx) -> Result<TraceUpdate, NodeError> {
        Ok(TraceUpdate {
            counter: Some(state.counter + 1),
            visited: vec![self.0.to_string()],
            ..Default::default()
        })
    }
}

/// Sleeps `delay_ms`, then records `item`; items starting with "fail" error.
struct SlowBranch;

#[async_trait]
impl NodeHandler<Trace> for SlowBranch {
    async fn run(&self, state: &Trace, _ctx: &NodeCtx) -> Result<TraceUpdate, NodeError> {
        tokio::time::sleep(Duration::from_millis(state.delay_ms)).await;
        if state.item.starts_with("fail") {
            return Err(NodeError::fatal(format!("{} failed", state.item)));
        }
        Ok(TraceUpdate {
            visited: vec![state.item.clone()],
            ..Default::default()
        })
    }
}

fn make_scope() -> RunScope {
    let gateway = Arc::new(ModelGateway::new(Arc::new(ScriptedFactory::new())));
    RunScope::new(Arc::new(RunConfig::default()), Services::builder(gateway).build()).with_run_id("run-1")
}

fn make_graph_fan_out(items: Vec<(&'static str, u64)>) -> CompiledGraph<Trace> {
    GraphBuilder::<Trace>::new("fan")
        .add_node("start", Visit("start"))
        .add_node("branch", SlowBranch)
        .add_node("join", Visit("join"))
        .set_entry("start")
        .add_fan_out(
            "start",
            move |_, _| {
                items
                    .iter()
                    .map(|(item, delay_ms)| {
                        Dispatch::new(
                            "branch",
                            Trace {
                                item: item.to_string(),
                                delay_ms: *delay_ms,
                                ..Default::default()
                            },
                        )
                    })
                    .collect()
            },
            &["branch"],
            "join",
        )
        .add_edge("join", END)
        .compile()
        .unwrap()
}

fn make_graph_loop(stop_at: u32) -> CompiledGraph<Trace> {
    GraphBuilder::<Trace>::new("loop")
        .add_node("tick", Visit("tick"))
        .set_entry("tick")
        .add_conditional_edges(
            "tick",
            move |state: &Trace, _: &RunConfig| if state.counter >= stop_at { END } else { "tick" },
            &["tick", END],
        )
        .compile()
        .unwrap()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

#[tokio::test]
async fn test_linear_execution() {
    let graph = GraphBuilder::<Trace>::new("linear")
        .add_node("a", Visit("a"))
        .add_node("b", Visit("b"))
        .set_entry("a")
        .add_edge("a", "b")
        .add_edge("b", END)
        .compile()
        .unwrap();

    let state = Executor::default()
        .run(&graph, Trace::default(), &make_scope())
        .await
        .unwrap();
    assert_eq!(state.visited, ["a", "b"]);
    assert_eq!(state.counter, 2);
}

#[tokio::test]
async fn test_conditional_loop_terminates() {
    let state = Executor::default()
        .run(&make_graph_loop(3), Trace::default(), &make_scope())
        .await
        .unwrap();
    assert_eq!(state.visited.len(), 3);
}

#[tokio::test]
async fn test_step_limit() {
    let executor = Executor::new(ExecutorConfig {
        max_steps: 5,
        ..Default::default()
    });
    let err = executor
        .run(&make_graph_loop(u32::MAX), Trace::default(), &make_scope())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::StepLimit { limit: 5, .. }));
}

#[tokio::test]
async fn test_undeclared_route() {
    let graph = GraphBuilder::<Trace>::new("bad-route")
        .add_node("a", Visit("a"))
        .set_entry("a")
        .add_conditional_edges("a", |_: &Trace, _: &RunConfig| "elsewhere", &[END])
        .compile()
        .unwrap();
    let err = Executor::default()
        .run(&graph, Trace::default(), &make_scope())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ExecutorError::InvalidRoute { ref from, ref target, .. } if from == "a" && target == "elsewhere")
    );
}

#[tokio::test]
async fn test_fan_in_ordering() {
    // Completion order is b, c, a; merge order must follow dispatch order.
    let graph = make_graph_fan_out(vec![("a", 60), ("b", 5), ("c", 30)]);
    let state = Executor::default()
        .run(&graph, Trace::default(), &make_scope())
        .await
        .unwrap();
    assert_eq!(state.visited, ["start", "a", "b", "c", "join"]);
}

#[tokio::test]
async fn test_empty_fan_out_goes_to_join() {
    let graph = make_graph_fan_out(Vec::new());
    let state = Executor::default()
        .run(&graph, Trace::default(), &make_scope())
        .await
        .unwrap();
    assert_eq!(state.visited, ["start", "join"]);
}

#[tokio::test]
async fn test_fan_out_partial_failure_reports_lowest_index() {
    let graph = make_graph_fan_out(vec![("ok", 0), ("fail-late", 50), ("fail-early", 5)]);
    let err = Executor::default()
        .run(&graph, Trace::default(), &make_scope())
        .await
        .unwrap_err();
    match err {
        ExecutorError::NodeFailed {
            node,
            snapshot,
            source,
            ..
        } => {
            assert_eq!(node, "branch");
            assert_eq!(snapshot["item"], "fail-late");
            assert_eq!(source.to_string(), "fatal: fail-late failed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_node_failure_carries_snapshot() {
    let graph = GraphBuilder::<Trace>::new("failing")
        .add_node("a", Visit("a"))
        .add_node(
            "boom",
            FnNode(|_: &Trace, _: &NodeCtx| {
                Err::<TraceUpdate, _>(NodeError::contract("not allowed"))
            }),
        )
        .set_entry("a")
        .add_edge("a", "boom")
        .add_edge("boom", END)
        .compile()
        .unwrap();
    let err = Executor::default()
        .run(&graph, Trace::default(), &make_scope())
        .await
        .unwrap_err();
    assert_eq!(err.node(), Some("boom"));
    assert!(err.is_contract_violation());
    let ExecutorError::NodeFailed { snapshot, .. } = err else {
        panic!("expected NodeFailed");
    };
    assert_eq!(snapshot["counter"], 1);
    assert_eq!(snapshot["visited"][0], "a");
}

#[tokio::test]
async fn test_execution_events() {
    let executor = Executor::default();
    let mut rx = executor.subscribe();
    let graph = make_graph_fan_out(vec![("x", 0), ("y", 0)]);
    executor
        .run(&graph, Trace::default(), &make_scope())
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(ExecutionEvent::RunStarted { graph, .. }) if graph == "fan"
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::FanOutDispatched { targets, .. } if targets.len() == 2
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::FanOutJoined { join, branches: 2, .. } if join == "join"
    )));
    let started = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::NodeStarted { .. }))
        .count();
    assert_eq!(started, 4);
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunCompleted { steps: 4, .. })
    ));
}
