//! Top-level assistant graph.
//!
//! ```text
//! process_query ──select_route──▶ collect_knowledge | finalize_answer
//! collect_knowledge ──fan-out──▶ web_search, memory_search ──▶ knowledge_collected
//! knowledge_collected ──▶ process_query
//! finalize_answer ──▶ END
//! ```
//!
//! `process_query` decides per pass whether more knowledge is needed. The
//! loop is bounded by `max_processing_iterations`: once the counter reaches
//! it, routing always goes to `finalize_answer`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::memory::{memory_graph, MemoryState};
use super::research::{research_graph, ResearchState};
use crate::config::RunConfig;
use crate::graph::{CompiledGraph, Dispatch, GraphBuilder, GraphError, END};
use crate::node_ctx::NodeCtx;
use crate::prompts::{self, ProcessQueryPrompt};
use crate::subgraph::Subgraph;
use crate::tool_loop::ToolCallLoop;
use crate::traits::{FnNode, NodeHandler};
use crate::types::{MemoryAccessRecord, Message, NodeError, ProcessingResult, Role};

pub const PROCESS_QUERY: &str = "process_query";
pub const COLLECT_KNOWLEDGE: &str = "collect_knowledge";
pub const WEB_SEARCH: &str = "web_search";
pub const MEMORY_SEARCH: &str = "memory_search";
pub const KNOWLEDGE_COLLECTED: &str = "knowledge_collected";
pub const FINALIZE_ANSWER: &str = "finalize_answer";

crate::graph_state! {
    /// State of the assistant graph for one user turn.
    pub struct AssistantState => AssistantUpdate {
        overwrite user_query: String,
        /// Lowercase user identity, empty when unknown.
        overwrite user: String,
        append messages: Message,
        append knowledge_search_results: String,
        append memory_access_registry: MemoryAccessRecord,
        overwrite processing_iteration: u32,
        overwrite processing_summary: String,
        overwrite processing_answer: String,
        overwrite requires_web_search: bool,
        overwrite requires_long_term_memory_access: bool,
        overwrite instructions_for_web_search: String,
        overwrite instructions_for_long_term_memory_access: String,
    }
}

impl AssistantState {
    /// Conversation without system messages.
    fn conversation(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    fn wants_memory(&self) -> bool {
        self.requires_long_term_memory_access && !self.user.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Query processing and routing
// ---------------------------------------------------------------------------

/// One decision pass over the conversation and the knowledge so far.
pub struct ProcessQuery;

#[async_trait]
impl NodeHandler<AssistantState> for ProcessQuery {
    async fn run(&self, state: &AssistantState, ctx: &NodeCtx) -> Result<AssistantUpdate, NodeError> {
        let config = ctx.config();
        let iteration = state.processing_iteration + 1;
        let date = prompts::current_date();
        let system = prompts::process_query(&ProcessQueryPrompt {
            assistant_name: &config.assistant_name,
            date: &date,
            user: &state.user,
            iteration,
            max_iterations: config.max_processing_iterations,
            previous_summary: &state.processing_summary,
            knowledge: &state.knowledge_search_results,
            registry: &state.memory_access_registry,
        });
        let mut messages = vec![Message::system(system)];
        messages.extend(state.conversation());

        let result: ProcessingResult = ctx
            .models()
            .structured(&config.model_name, 0.0, messages, config.structured_output_retries)
            .await?;

        let named = result.user.trim().to_lowercase();
        let user = if named.is_empty() { state.user.clone() } else { named };
        if result.requires_long_term_memory_access && user.is_empty() {
            warn!(iteration, "memory access requested but the user is unknown, skipping memory");
        }
        info!(
            iteration,
            web = result.requires_web_search,
            memory = result.requires_long_term_memory_access,
            "processed query"
        );
        Ok(AssistantUpdate {
            user: Some(user),
            processing_iteration: Some(iteration),
            processing_summary: Some(result.summary),
            processing_answer: Some(result.answer.unwrap_or_default()),
            requires_web_search: Some(result.requires_web_search),
            requires_long_term_memory_access: Some(result.requires_long_term_memory_access),
            instructions_for_web_search: Some(result.instructions_for_web_search.unwrap_or_default()),
            instructions_for_long_term_memory_access: Some(
                result.instructions_for_long_term_memory_access.unwrap_or_default(),
            ),
            ..Default::default()
        })
    }
}

/// Router after `process_query`.
pub fn select_route(state: &AssistantState, config: &RunConfig) -> &'static str {
    if state.processing_iteration >= config.max_processing_iterations {
        return FINALIZE_ANSWER;
    }
    if state.requires_web_search || state.wants_memory() {
        COLLECT_KNOWLEDGE
    } else {
        FINALIZE_ANSWER
    }
}

// ---------------------------------------------------------------------------
// Knowledge collection
// ---------------------------------------------------------------------------

/// One branch per required knowledge source, web first.
pub fn dispatch_knowledge_collection(
    state: &AssistantState,
    _: &RunConfig,
) -> Vec<Dispatch<AssistantState>> {
    let mut dispatches = Vec::new();
    if state.requires_web_search {
        dispatches.push(Dispatch::new(WEB_SEARCH, state.clone()));
    }
    if state.wants_memory() {
        dispatches.push(Dispatch::new(MEMORY_SEARCH, state.clone()));
    }
    dispatches
}

fn web_search(graph: Arc<CompiledGraph<ResearchState>>) -> Subgraph<AssistantState, ResearchState> {
    Subgraph::new(
        graph,
        |state: &AssistantState, _: &RunConfig| {
            let mut messages = state.conversation();
            if !state.instructions_for_web_search.trim().is_empty() {
                messages.push(Message::human(format!(
                    "Research instructions: {}",
                    state.instructions_for_web_search
                )));
            }
            ResearchState::for_messages(messages)
        },
        |_: &AssistantState, research: ResearchState| AssistantUpdate {
            knowledge_search_results: non_empty(research.final_answer),
            ..Default::default()
        },
    )
}

fn memory_search(graph: Arc<CompiledGraph<MemoryState>>) -> Subgraph<AssistantState, MemoryState> {
    Subgraph::new(
        graph,
        |state: &AssistantState, _: &RunConfig| MemoryState {
            messages: state.conversation(),
            user: state.user.clone(),
            instructions: state.instructions_for_long_term_memory_access.clone(),
            memory_access_registry: state.memory_access_registry.clone(),
            ..Default::default()
        },
        |state: &AssistantState, memory: MemoryState| {
            let known = state.memory_access_registry.len();
            let new_records: Vec<MemoryAccessRecord> =
                memory.memory_access_registry.into_iter().skip(known).collect();
            let content = if memory.analysis.trim().is_empty() && !new_records.is_empty() {
                prompts::render_registry(&new_records)
            } else {
                memory.analysis
            };
            AssistantUpdate {
                knowledge_search_results: non_empty(content),
                memory_access_registry: new_records,
                ..Default::default()
            }
        },
    )
    .with_config(|state: &AssistantState, config: &RunConfig| config.clone().with_user(state.user.clone()))
}

fn non_empty(text: String) -> Vec<String> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![text]
    }
}

// ---------------------------------------------------------------------------
// Final answer
// ---------------------------------------------------------------------------

/// Answers the user, running requested capability calls until the model
/// stops asking or `max_tool_iterations` is reached.
pub struct FinalizeAnswer;

#[async_trait]
impl NodeHandler<AssistantState> for FinalizeAnswer {
    async fn run(&self, state: &AssistantState, ctx: &NodeCtx) -> Result<AssistantUpdate, NodeError> {
        let config = ctx.config();
        let system = prompts::final_answer(
            &config.assistant_name,
            &prompts::current_date(),
            &state.processing_summary,
            &state.processing_answer,
            &state.knowledge_search_results,
        );
        let mut transcript = vec![Message::system(system)];
        transcript.extend(state.conversation());

        let outcome = ToolCallLoop::new(ctx.models(), ctx.capabilities(), config.model_name.as_str())
            .max_iterations(config.max_tool_iterations)
            .run(transcript)
            .await?;
        if outcome.exhausted {
            warn!(iterations = outcome.iterations, "answer ended at the tool-call cap");
        }
        debug!(iterations = outcome.iterations, messages = outcome.messages.len(), "answer ready");
        Ok(AssistantUpdate {
            messages: outcome.messages,
            ..Default::default()
        })
    }
}

pub fn assistant_graph() -> Result<CompiledGraph<AssistantState>, GraphError> {
    let research = Arc::new(research_graph()?);
    let memory = Arc::new(memory_graph()?);
    GraphBuilder::<AssistantState>::new("assistant")
        .add_node(PROCESS_QUERY, ProcessQuery)
        .add_node(
            COLLECT_KNOWLEDGE,
            FnNode(|state: &AssistantState, ctx: &NodeCtx| {
                info!(
                    iteration = state.processing_iteration,
                    web = state.requires_web_search,
                    memory = state.wants_memory(),
                    run_id = ctx.run_id(),
                    "collecting knowledge"
                );
                Ok::<_, NodeError>(AssistantUpdate::default())
            }),
        )
        .add_node(WEB_SEARCH, web_search(research))
        .add_node(MEMORY_SEARCH, memory_search(memory))
        .add_node(
            KNOWLEDGE_COLLECTED,
            FnNode(|state: &AssistantState, _: &NodeCtx| {
                info!(
                    results = state.knowledge_search_results.len(),
                    memory_operations = state.memory_access_registry.len(),
                    "knowledge collected"
                );
                Ok::<_, NodeError>(AssistantUpdate::default())
            }),
        )
        .add_node(FINALIZE_ANSWER, FinalizeAnswer)
        .set_entry(PROCESS_QUERY)
        .add_conditional_edges(PROCESS_QUERY, select_route, &[COLLECT_KNOWLEDGE, FINALIZE_ANSWER])
        .add_fan_out(
            COLLECT_KNOWLEDGE,
            dispatch_knowledge_collection,
            &[WEB_SEARCH, MEMORY_SEARCH],
            KNOWLEDGE_COLLECTED,
        )
        .add_edge(KNOWLEDGE_COLLECTED, PROCESS_QUERY)
        .add_edge(FINALIZE_ANSWER, END)
        .compile()
}
