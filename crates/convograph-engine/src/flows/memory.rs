//! Long-term memory graph.
//!
//! `generate_memory_queries → access_memory → [analyze_results] → END`.
//!
//! The query generator sees the access registry of earlier operations so it
//! does not plan them again; `access_memory` also skips any operation the
//! registry already holds. Every executed read or write appends one
//! [`MemoryAccessRecord`].

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::graph::{CompiledGraph, GraphBuilder, GraphError, END};
use crate::node_ctx::NodeCtx;
use crate::prompts;
use crate::traits::{MemoryStore, NodeHandler};
use crate::types::{
    AccessOutcome, AccessType, MemoryAccessPlan, MemoryAccessQuery, MemoryAccessRecord, Message,
    ModelRequest, Namespace, NodeError,
};

pub const GENERATE_MEMORY_QUERIES: &str = "generate_memory_queries";
pub const ACCESS_MEMORY: &str = "access_memory";
pub const ANALYZE_RESULTS: &str = "analyze_results";

crate::graph_state! {
    /// State of the memory graph.
    pub struct MemoryState => MemoryUpdate {
        append messages: Message,
        /// User the conversation is with, for the prompt.
        overwrite user: String,
        /// What the caller wants from memory.
        overwrite instructions: String,
        overwrite memory_access_queries: Vec<MemoryAccessQuery>,
        append memory_access_registry: MemoryAccessRecord,
        overwrite analysis: String,
    }
}

// ---------------------------------------------------------------------------
// Store operations
// ---------------------------------------------------------------------------

/// Namespace of `query` for a run configured with `config`.
pub fn namespace_for(query: &MemoryAccessQuery, config: &RunConfig) -> Namespace {
    Namespace::resolve(
        query.user.as_deref(),
        query.memory_type.as_str(),
        config.user.as_deref(),
        &config.memory.default_user,
    )
}

/// Search `namespace` for `query`. Fails with a contract violation if the
/// query is not a read.
pub async fn read_memory(
    store: &dyn MemoryStore,
    namespace: &Namespace,
    query: &MemoryAccessQuery,
    limit: usize,
) -> Result<MemoryAccessRecord, NodeError> {
    if query.access_type != AccessType::Read {
        return Err(NodeError::contract(format!(
            "read_memory called with a {} query: {}",
            query.access_type, query.query
        )));
    }
    let matches = store.search(namespace, &query.query, limit).await?;
    debug!(%namespace, found = matches.len(), "read memory");
    Ok(MemoryAccessRecord {
        query: query.clone(),
        namespace: namespace.clone(),
        outcome: AccessOutcome::Read { matches },
        at: Utc::now(),
    })
}

/// Store `query` as a new memory under a fresh key. Fails with a contract
/// violation if the query is not a write.
pub async fn write_memory(
    store: &dyn MemoryStore,
    namespace: &Namespace,
    query: &MemoryAccessQuery,
) -> Result<MemoryAccessRecord, NodeError> {
    if query.access_type != AccessType::Write {
        return Err(NodeError::contract(format!(
            "write_memory called with a {} query: {}",
            query.access_type, query.query
        )));
    }
    let key = Uuid::new_v4().to_string();
    let now = Utc::now();
    let value = json!({
        "content": query.query,
        "rationale": query.rationale,
        "memory_type": query.memory_type,
        "created_at": now,
    });
    store.put(namespace, &key, value).await?;
    debug!(%namespace, %key, "wrote memory");
    Ok(MemoryAccessRecord {
        query: query.clone(),
        namespace: namespace.clone(),
        outcome: AccessOutcome::Written { key },
        at: now,
    })
}

fn already_done(registry: &[MemoryAccessRecord], namespace: &Namespace, query: &MemoryAccessQuery) -> bool {
    registry.iter().any(|record| {
        record.namespace == *namespace
            && record.query.access_type == query.access_type
            && record.query.query.trim().eq_ignore_ascii_case(query.query.trim())
    })
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Plans reads and writes for the conversation.
pub struct GenerateMemoryQueries;

#[async_trait]
impl NodeHandler<MemoryState> for GenerateMemoryQueries {
    async fn run(&self, state: &MemoryState, ctx: &NodeCtx) -> Result<MemoryUpdate, NodeError> {
        let config = ctx.config();
        let mut messages = vec![Message::system(prompts::memory_queries(
            &state.user,
            &state.instructions,
            &state.memory_access_registry,
        ))];
        messages.extend(state.messages.iter().cloned());
        let plan: MemoryAccessPlan = ctx
            .models()
            .structured(
                &config.memory.model_name,
                config.memory.query_temperature,
                messages,
                config.structured_output_retries,
            )
            .await?;
        info!(queries = plan.memory_access_queries.len(), "planned memory access");
        Ok(MemoryUpdate {
            memory_access_queries: Some(plan.memory_access_queries),
            ..Default::default()
        })
    }
}

/// Executes the planned operations in order.
pub struct AccessMemory;

#[async_trait]
impl NodeHandler<MemoryState> for AccessMemory {
    async fn run(&self, state: &MemoryState, ctx: &NodeCtx) -> Result<MemoryUpdate, NodeError> {
        let config = ctx.config();
        let store = ctx.store().as_ref();
        let mut records: Vec<MemoryAccessRecord> = Vec::new();
        for query in &state.memory_access_queries {
            let namespace = namespace_for(query, config);
            if already_done(&state.memory_access_registry, &namespace, query)
                || already_done(&records, &namespace, query)
            {
                debug!(%namespace, query = %query.query, "memory operation already done, skipping");
                continue;
            }
            let record = match query.access_type {
                AccessType::Read => read_memory(store, &namespace, query, config.memory.read_limit).await?,
                AccessType::Write => write_memory(store, &namespace, query).await?,
            };
            records.push(record);
        }
        Ok(MemoryUpdate {
            memory_access_registry: records,
            ..Default::default()
        })
    }
}

/// Summarizes this run's memory operations for the caller.
pub struct AnalyzeResults;

#[async_trait]
impl NodeHandler<MemoryState> for AnalyzeResults {
    async fn run(&self, state: &MemoryState, ctx: &NodeCtx) -> Result<MemoryUpdate, NodeError> {
        if state.memory_access_registry.is_empty() {
            return Ok(MemoryUpdate {
                analysis: Some("No memory operations were needed.".into()),
                ..Default::default()
            });
        }
        let config = ctx.config();
        let prompt = prompts::memory_analysis(&state.instructions, &state.memory_access_registry);
        let reply = ctx
            .models()
            .invoke(
                &config.memory.model_name,
                0.0,
                ModelRequest::new(vec![Message::human(prompt)]),
            )
            .await?;
        Ok(MemoryUpdate {
            analysis: Some(reply.content),
            ..Default::default()
        })
    }
}

fn after_access(_: &MemoryState, config: &RunConfig) -> &'static str {
    if config.memory.analyze_results {
        ANALYZE_RESULTS
    } else {
        END
    }
}

pub fn memory_graph() -> Result<CompiledGraph<MemoryState>, GraphError> {
    GraphBuilder::<MemoryState>::new("memory")
        .add_node(GENERATE_MEMORY_QUERIES, GenerateMemoryQueries)
        .add_node(ACCESS_MEMORY, AccessMemory)
        .add_node(ANALYZE_RESULTS, AnalyzeResults)
        .set_entry(GENERATE_MEMORY_QUERIES)
        .add_edge(GENERATE_MEMORY_QUERIES, ACCESS_MEMORY)
        .add_conditional_edges(ACCESS_MEMORY, after_access, &[ANALYZE_RESULTS, END])
        .add_edge(ANALYZE_RESULTS, END)
        .compile()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::defaults::{InMemoryStore, ScriptedModel};
    use crate::executor::Executor;
    use crate::node_ctx::test_support::TestNodeCtx;
    use crate::types::MemoryType;

    fn query(text: &str, memory_type: MemoryType, access_type: AccessType) -> MemoryAccessQuery {
        MemoryAccessQuery {
            query: text.into(),
            memory_type,
            access_type,
            user: None,
            rationale: String::new(),
        }
    }

    #[tokio::test]
    async fn writing_a_read_query_is_a_contract_violation() {
        let store = InMemoryStore::new();
        let ns = Namespace::new("bob", "facts");
        let err = write_memory(&store, &ns, &query("likes tea", MemoryType::Facts, AccessType::Read))
            .await
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert!(store.list(&ns).await.is_empty());

        let err = read_memory(&store, &ns, &query("tea", MemoryType::Facts, AccessType::Write), 5)
            .await
            .unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_namespace() {
        let store = InMemoryStore::new();
        let config = RunConfig::default().with_user("Carol");
        let write = query("Carol has a dog named Rex", MemoryType::Events, AccessType::Write);
        let ns = namespace_for(&write, &config);
        assert_eq!(ns, Namespace::new("carol", "events"));

        let written = write_memory(&store, &ns, &write).await.unwrap();
        assert!(matches!(written.outcome, AccessOutcome::Written { .. }));

        let read = read_memory(&store, &ns, &query("dog", MemoryType::Events, AccessType::Read), 10)
            .await
            .unwrap();
        let AccessOutcome::Read { matches } = read.outcome else {
            panic!("expected read outcome");
        };
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text(), "Carol has a dog named Rex");
    }

    #[tokio::test]
    async fn access_skips_operations_in_registry() {
        let store = Arc::new(InMemoryStore::new());
        let ctx = TestNodeCtx::builder()
            .config(RunConfig::default().with_user("dave"))
            .store(store.clone())
            .build();
        let write = query("dave likes chess", MemoryType::Preferences, AccessType::Write);
        let earlier = write_memory(store.as_ref(), &namespace_for(&write, ctx.config()), &write)
            .await
            .unwrap();

        let state = MemoryState {
            memory_access_queries: vec![
                write.clone(),
                query("chess", MemoryType::Preferences, AccessType::Read),
                query("chess", MemoryType::Preferences, AccessType::Read),
            ],
            memory_access_registry: vec![earlier],
            ..Default::default()
        };
        let update = AccessMemory.run(&state, &ctx).await.unwrap();
        assert_eq!(update.memory_access_registry.len(), 1);
        assert_eq!(update.memory_access_registry[0].query.access_type, AccessType::Read);
        assert_eq!(store.list(&Namespace::new("dave", "preferences")).await.len(), 1);
    }

    #[tokio::test]
    async fn graph_plans_accesses_and_analyzes() {
        let model = Arc::new(ScriptedModel::new("openai", |request| {
            if request.output_schema.is_some() {
                Message::assistant(
                    r#"{"memory_access_queries": [
                        {"query": "Erin lives in Oslo", "memory_type": "facts", "access_type": "write", "user": "Erin"},
                        {"query": "Oslo", "memory_type": "facts", "access_type": "read"}
                    ]}"#,
                )
            } else {
                Message::assistant("Erin lives in Oslo.")
            }
        }));
        let store = Arc::new(InMemoryStore::new());
        let ctx = TestNodeCtx::builder()
            .config(RunConfig::default().with_user("erin"))
            .model("openai", model)
            .store(store.clone())
            .build();

        let state = Executor::default()
            .run(
                &memory_graph().unwrap(),
                MemoryState {
                    messages: vec![Message::human("I moved to Oslo")],
                    user: "erin".into(),
                    ..Default::default()
                },
                ctx.scope(),
            )
            .await
            .unwrap();

        assert_eq!(state.memory_access_registry.len(), 2);
        let AccessOutcome::Read { matches } = &state.memory_access_registry[1].outcome else {
            panic!("expected read outcome");
        };
        assert_eq!(matches.len(), 1);
        assert_eq!(state.analysis, "Erin lives in Oslo.");
        assert_eq!(store.namespaces().await, [Namespace::new("erin", "facts")]);
    }

    #[tokio::test]
    async fn analysis_can_be_disabled() {
        let model = Arc::new(ScriptedModel::new("openai", |_| {
            Message::assistant(r#"{"memory_access_queries": []}"#)
        }));
        let mut config = RunConfig::default();
        config.memory.analyze_results = false;
        let ctx = TestNodeCtx::builder().config(config).model("openai", model.clone()).build();

        let state = Executor::default()
            .run(&memory_graph().unwrap(), MemoryState::default(), ctx.scope())
            .await
            .unwrap();
        assert!(state.analysis.is_empty());
        assert_eq!(model.calls(), 1);
    }
}
