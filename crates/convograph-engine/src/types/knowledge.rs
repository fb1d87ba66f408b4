//! Structured model outputs and knowledge-collection records.
//!
//! Types deriving [`JsonSchema`] are requested from models as structured
//! output; their schema is sent with the request and the reply is validated
//! by deserializing into them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Outcome of one query-processing step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingResult {
    /// Summary of what is known about the user's query so far.
    pub summary: String,
    /// Direct answer, when the query can be answered without more knowledge.
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub requires_web_search: bool,
    #[serde(default)]
    pub requires_long_term_memory_access: bool,
    #[serde(default)]
    pub instructions_for_web_search: Option<String>,
    #[serde(default)]
    pub instructions_for_long_term_memory_access: Option<String>,
    /// Name of the user, lowercase, empty when unknown.
    #[serde(default)]
    pub user: String,
}

/// A single web search to run, with the reason it helps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WebResearchQuery {
    pub query: String,
    #[serde(default)]
    pub rationale: String,
}

impl WebResearchQuery {
    pub fn new(query: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            rationale: rationale.into(),
        }
    }
}

/// Structured output of the research query generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WebResearchPlan {
    pub web_research_queries: Vec<WebResearchQuery>,
}

/// Structured output of the research reflection step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReflectionResult {
    pub is_sufficient: bool,
    #[serde(default)]
    pub knowledge_gap: String,
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
}

/// One hit returned by a [`WebSearch`](crate::traits::WebSearch) provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// A URL found while researching, tagged with the query that found it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub query: String,
    pub url: String,
}

/// Summary of one fetched page, relative to the query that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub query: String,
    pub url: String,
    pub analysis: String,
}

/// Marker the page analyzer returns when a page has nothing relevant.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found";

impl PageAnalysis {
    pub fn is_relevant(&self) -> bool {
        let text = self.analysis.trim();
        !text.is_empty() && !text.starts_with(NO_RELEVANT_INFORMATION)
    }
}
