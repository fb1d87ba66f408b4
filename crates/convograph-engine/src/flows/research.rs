//! Deep-research graph.
//!
//! ```text
//! generate_query ──fan-out──▶ web_research ──▶ select_pages
//! select_pages ──fan-out──▶ content_analysis ──▶ reflection
//! reflection ──▶ finalize_answer | plan_follow_up
//! plan_follow_up ──fan-out──▶ web_research ──▶ select_pages
//! ```
//!
//! Each search query runs as its own `web_research` branch and each new URL
//! as its own `content_analysis` branch (the page-analyzer graph). The loop
//! ends when reflection finds the pages sufficient, proposes no follow-ups,
//! or `research_loop_count` reaches `research.max_research_loops`; so a run
//! reflects at most `max_research_loops + 1` times.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::page::{page_graph, PageState};
use crate::config::RunConfig;
use crate::graph::{CompiledGraph, Dispatch, GraphBuilder, GraphError, END};
use crate::node_ctx::NodeCtx;
use crate::prompts;
use crate::subgraph::Subgraph;
use crate::traits::{FnNode, NodeHandler};
use crate::types::{
    Message, ModelRequest, NodeError, PageAnalysis, ReflectionResult, WebResearchPlan,
    WebResearchQuery, WebSearchResult,
};

pub const GENERATE_QUERY: &str = "generate_query";
pub const WEB_RESEARCH: &str = "web_research";
pub const SELECT_PAGES: &str = "select_pages";
pub const CONTENT_ANALYSIS: &str = "content_analysis";
pub const REFLECTION: &str = "reflection";
pub const PLAN_FOLLOW_UP: &str = "plan_follow_up";
pub const FINALIZE_ANSWER: &str = "finalize_answer";

crate::graph_state! {
    /// State of the deep-research graph.
    pub struct ResearchState => ResearchUpdate {
        /// Conversation to research; the final answer is appended.
        append messages: Message,
        /// Queries for the next search round. Set on input to skip query
        /// generation.
        overwrite pending_queries: Vec<WebResearchQuery>,
        /// Input of one `web_research` branch.
        overwrite search_query: WebResearchQuery,
        /// Every query searched so far.
        append search_queries: WebResearchQuery,
        append web_research_results: WebSearchResult,
        /// URLs chosen for the next analysis round.
        overwrite pending_pages: Vec<WebSearchResult>,
        /// Input of one `content_analysis` branch.
        overwrite page: WebSearchResult,
        append page_analyses: PageAnalysis,
        overwrite is_sufficient: bool,
        overwrite knowledge_gap: String,
        overwrite follow_up_queries: Vec<String>,
        overwrite research_loop_count: u32,
        overwrite reflection_count: u32,
        overwrite final_answer: String,
    }
}

impl ResearchState {
    /// State for researching `messages` from scratch.
    pub fn for_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    fn topic(&self) -> String {
        prompts::research_topic(&self.messages)
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Writes the initial search queries, unless the input already has some.
pub struct GenerateQuery;

#[async_trait]
impl NodeHandler<ResearchState> for GenerateQuery {
    async fn run(&self, state: &ResearchState, ctx: &NodeCtx) -> Result<ResearchUpdate, NodeError> {
        if !state.pending_queries.is_empty() {
            info!(queries = state.pending_queries.len(), "search queries given, skipping generation");
            return Ok(ResearchUpdate::default());
        }

        let config = ctx.config();
        let wanted = config.research.number_of_initial_queries.max(1);
        let topic = state.topic();
        let plan: WebResearchPlan = ctx
            .models()
            .structured(
                &config.research.query_generator_model,
                1.0,
                vec![Message::human(prompts::query_writer(
                    &topic,
                    &prompts::current_date(),
                    wanted,
                ))],
                config.structured_output_retries,
            )
            .await?;

        let mut queries: Vec<WebResearchQuery> = plan
            .web_research_queries
            .into_iter()
            .filter(|q| !q.query.trim().is_empty())
            .take(wanted)
            .collect();
        if queries.is_empty() {
            warn!("query generator returned no queries, searching the topic itself");
            queries.push(WebResearchQuery::new(topic.trim(), "the research topic itself"));
        }
        debug!(queries = queries.len(), "generated search queries");
        Ok(ResearchUpdate {
            pending_queries: Some(queries),
            ..Default::default()
        })
    }
}

/// Branch: one web search, recording the URLs it found.
///
/// A failing search provider yields no URLs rather than failing the run.
pub struct WebResearch;

#[async_trait]
impl NodeHandler<ResearchState> for WebResearch {
    async fn run(&self, state: &ResearchState, ctx: &NodeCtx) -> Result<ResearchUpdate, NodeError> {
        let query = &state.search_query;
        let limit = ctx.config().research.number_of_results_per_query;
        let hits = match ctx.web_search().search(&query.query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(query = %query.query, error = %e, "web search failed");
                Vec::new()
            }
        };
        debug!(query = %query.query, hits = hits.len(), "web search done");
        Ok(ResearchUpdate {
            search_queries: vec![query.clone()],
            web_research_results: hits
                .into_iter()
                .take(limit)
                .map(|hit| WebSearchResult {
                    query: query.query.clone(),
                    url: hit.url,
                })
                .collect(),
            ..Default::default()
        })
    }
}

/// URLs found but not analyzed yet, first occurrence wins.
pub fn select_new_pages(state: &ResearchState) -> Vec<WebSearchResult> {
    let mut seen: HashSet<&str> = state.page_analyses.iter().map(|a| a.url.as_str()).collect();
    let mut picked = Vec::new();
    for result in &state.web_research_results {
        if seen.insert(result.url.as_str()) {
            picked.push(result.clone());
        }
    }
    picked
}

/// Asks whether the analyzed pages answer the topic.
pub struct Reflection;

#[async_trait]
impl NodeHandler<ResearchState> for Reflection {
    async fn run(&self, state: &ResearchState, ctx: &NodeCtx) -> Result<ResearchUpdate, NodeError> {
        let config = ctx.config();
        let result: ReflectionResult = ctx
            .models()
            .structured(
                &config.research.reflection_model,
                1.0,
                vec![Message::human(prompts::reflection(
                    &state.topic(),
                    &prompts::current_date(),
                    &state.page_analyses,
                ))],
                config.structured_output_retries,
            )
            .await?;
        info!(
            sufficient = result.is_sufficient,
            follow_ups = result.follow_up_queries.len(),
            loop_count = state.research_loop_count,
            "reflected on research"
        );
        Ok(ResearchUpdate {
            is_sufficient: Some(result.is_sufficient),
            knowledge_gap: Some(result.knowledge_gap),
            follow_up_queries: Some(result.follow_up_queries),
            reflection_count: Some(state.reflection_count + 1),
            ..Default::default()
        })
    }
}

/// Router after reflection.
pub fn evaluate_research(state: &ResearchState, config: &RunConfig) -> &'static str {
    if state.is_sufficient
        || state.research_loop_count >= config.research.max_research_loops
        || state.follow_up_queries.iter().all(|q| q.trim().is_empty())
    {
        FINALIZE_ANSWER
    } else {
        PLAN_FOLLOW_UP
    }
}

/// Turns the follow-up queries into the next search round and counts the
/// loop.
fn plan_follow_up(state: &ResearchState) -> ResearchUpdate {
    let queries = state
        .follow_up_queries
        .iter()
        .filter(|q| !q.trim().is_empty())
        .map(|q| WebResearchQuery::new(q.as_str(), state.knowledge_gap.as_str()))
        .collect();
    ResearchUpdate {
        pending_queries: Some(queries),
        research_loop_count: Some(state.research_loop_count + 1),
        ..Default::default()
    }
}

/// Writes the cited answer from the analyzed pages.
pub struct FinalizeAnswer;

#[async_trait]
impl NodeHandler<ResearchState> for FinalizeAnswer {
    async fn run(&self, state: &ResearchState, ctx: &NodeCtx) -> Result<ResearchUpdate, NodeError> {
        let prompt = prompts::research_answer(
            &state.topic(),
            &prompts::current_date(),
            &state.page_analyses,
        );
        let reply = ctx
            .models()
            .invoke(
                &ctx.config().research.answer_model,
                0.0,
                ModelRequest::new(vec![Message::human(prompt)]),
            )
            .await?;
        Ok(ResearchUpdate {
            messages: vec![Message::assistant(reply.content.clone())],
            final_answer: Some(reply.content),
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Fan-outs
// ---------------------------------------------------------------------------

fn dispatch_searches(state: &ResearchState, _: &RunConfig) -> Vec<Dispatch<ResearchState>> {
    state
        .pending_queries
        .iter()
        .map(|query| {
            Dispatch::new(
                WEB_RESEARCH,
                ResearchState {
                    search_query: query.clone(),
                    ..Default::default()
                },
            )
        })
        .collect()
}

fn dispatch_analyses(state: &ResearchState, _: &RunConfig) -> Vec<Dispatch<ResearchState>> {
    state
        .pending_pages
        .iter()
        .map(|page| {
            Dispatch::new(
                CONTENT_ANALYSIS,
                ResearchState {
                    page: page.clone(),
                    ..Default::default()
                },
            )
        })
        .collect()
}

fn content_analysis(page_graph: Arc<CompiledGraph<PageState>>) -> Subgraph<ResearchState, PageState> {
    Subgraph::new(
        page_graph,
        |state: &ResearchState, _: &RunConfig| PageState {
            search_query: state.page.query.clone(),
            url: state.page.url.clone(),
            ..Default::default()
        },
        |_: &ResearchState, page: PageState| ResearchUpdate {
            page_analyses: vec![PageAnalysis {
                query: page.search_query,
                url: page.url,
                analysis: page.analysis,
            }],
            ..Default::default()
        },
    )
}

pub fn research_graph() -> Result<CompiledGraph<ResearchState>, GraphError> {
    let pages = Arc::new(page_graph()?);
    GraphBuilder::<ResearchState>::new("deep_research")
        .add_node(GENERATE_QUERY, GenerateQuery)
        .add_node(WEB_RESEARCH, WebResearch)
        .add_node(
            SELECT_PAGES,
            FnNode(|state: &ResearchState, _: &NodeCtx| {
                Ok::<_, NodeError>(ResearchUpdate {
                    pending_pages: Some(select_new_pages(state)),
                    ..Default::default()
                })
            }),
        )
        .add_node(CONTENT_ANALYSIS, content_analysis(pages))
        .add_node(REFLECTION, Reflection)
        .add_node(
            PLAN_FOLLOW_UP,
            FnNode(|state: &ResearchState, _: &NodeCtx| Ok::<_, NodeError>(plan_follow_up(state))),
        )
        .add_node(FINALIZE_ANSWER, FinalizeAnswer)
        .set_entry(GENERATE_QUERY)
        .add_fan_out(GENERATE_QUERY, dispatch_searches, &[WEB_RESEARCH], SELECT_PAGES)
        .add_fan_out(SELECT_PAGES, dispatch_analyses, &[CONTENT_ANALYSIS], REFLECTION)
        .add_conditional_edges(REFLECTION, evaluate_research, &[PLAN_FOLLOW_UP, FINALIZE_ANSWER])
        .add_fan_out(PLAN_FOLLOW_UP, dispatch_searches, &[WEB_RESEARCH], SELECT_PAGES)
        .add_edge(FINALIZE_ANSWER, END)
        .compile()
}
