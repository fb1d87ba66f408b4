//! Page analyzer: fetch one URL and summarize it for a search query.
//!
//! `fetch_page → analyze_page → END`. Fetch failures arrive as text and are
//! analyzed like any page, so the graph itself only fails when the model
//! does.

use async_trait::async_trait;
use tracing::debug;

use crate::graph::{CompiledGraph, GraphBuilder, GraphError, END};
use crate::node_ctx::NodeCtx;
use crate::prompts;
use crate::traits::NodeHandler;
use crate::types::{Message, ModelRequest, NodeError};

pub const FETCH_PAGE: &str = "fetch_page";
pub const ANALYZE_PAGE: &str = "analyze_page";

crate::graph_state! {
    /// State of the page-analyzer graph.
    pub struct PageState => PageUpdate {
        overwrite search_query: String,
        overwrite url: String,
        overwrite page_content: String,
        overwrite analysis: String,
    }
}

/// Downloads the page text, cut to `research.max_page_chars` characters.
pub struct FetchPage;

#[async_trait]
impl NodeHandler<PageState> for FetchPage {
    async fn run(&self, state: &PageState, ctx: &NodeCtx) -> Result<PageUpdate, NodeError> {
        let text = ctx.web_fetch().fetch(&state.url).await;
        let fetched = text.len();
        let text = truncate_chars(text, ctx.config().research.max_page_chars);
        debug!(url = %state.url, fetched, kept = text.len(), "fetched page");
        Ok(PageUpdate {
            page_content: Some(text),
            ..Default::default()
        })
    }
}

/// Summarizes the page with the research analysis model.
pub struct AnalyzePage;

#[async_trait]
impl NodeHandler<PageState> for AnalyzePage {
    async fn run(&self, state: &PageState, ctx: &NodeCtx) -> Result<PageUpdate, NodeError> {
        let prompt = prompts::page_analysis(
            &state.search_query,
            &prompts::current_date(),
            &state.page_content,
        );
        let reply = ctx
            .models()
            .invoke(
                &ctx.config().research.analysis_model,
                1.0,
                ModelRequest::new(vec![Message::human(prompt)]),
            )
            .await?;
        Ok(PageUpdate {
            analysis: Some(reply.content),
            ..Default::default()
        })
    }
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
    }
    text
}

pub fn page_graph() -> Result<CompiledGraph<PageState>, GraphError> {
    GraphBuilder::<PageState>::new("page_analyzer")
        .add_node(FETCH_PAGE, FetchPage)
        .add_node(ANALYZE_PAGE, AnalyzePage)
        .set_entry(FETCH_PAGE)
        .add_edge(FETCH_PAGE, ANALYZE_PAGE)
        .add_edge(ANALYZE_PAGE, END)
        .compile()
}
