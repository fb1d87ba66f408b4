//! Run configuration.
//!
//! A [`RunConfig`] is created once per user turn and shared read-only by every
//! node in the run (and, unless a sub-graph overrides it, by nested runs).
//! All fields have defaults so partial JSON files are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::DEFAULT_USER;

/// Per-run settings for the assistant graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Conversation identifier, for logs.
    pub thread_id: Option<String>,
    /// Identity of the user, used for memory namespaces.
    pub user: Option<String>,
    /// Model used for query processing and the final answer.
    pub model_name: String,
    pub assistant_name: String,
    /// Maximum query-processing passes before answering regardless.
    pub max_processing_iterations: u32,
    /// Maximum model invocations in the final tool-call loop.
    pub max_tool_iterations: u32,
    /// Extra attempts after a structured reply fails validation.
    pub structured_output_retries: u32,
    pub research: ResearchConfig,
    pub memory: MemoryConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_id: None,
            user: None,
            model_name: "openai".into(),
            assistant_name: "Assistant".into(),
            max_processing_iterations: 3,
            max_tool_iterations: 5,
            structured_output_retries: 2,
            research: ResearchConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON file, then apply research overrides from the environment
    /// (see [`ResearchConfig::apply_env_overrides`]).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&text)?;
        config.research.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Reject values no run can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let require = |key: &str, value: &str| {
            if value.trim().is_empty() {
                Err(ConfigError::Invalid {
                    key: key.into(),
                    message: "must not be empty".into(),
                })
            } else {
                Ok(())
            }
        };
        require("model_name", &self.model_name)?;
        require("research.query_generator_model", &self.research.query_generator_model)?;
        require("research.reflection_model", &self.research.reflection_model)?;
        require("research.answer_model", &self.research.answer_model)?;
        require("research.analysis_model", &self.research.analysis_model)?;
        require("memory.model_name", &self.memory.model_name)?;
        if self.max_processing_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: "max_processing_iterations".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ResearchConfig
// ---------------------------------------------------------------------------

/// Settings for the deep-research sub-graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub query_generator_model: String,
    pub reflection_model: String,
    pub answer_model: String,
    /// Model that summarizes fetched pages.
    pub analysis_model: String,
    pub number_of_initial_queries: usize,
    pub number_of_results_per_query: usize,
    pub max_research_loops: u32,
    /// Page text beyond this many characters is dropped before analysis.
    pub max_page_chars: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            query_generator_model: "gpt-4o-mini".into(),
            reflection_model: "gpt-4o-mini".into(),
            answer_model: "gpt-4o".into(),
            analysis_model: "gpt-4o-mini".into(),
            number_of_initial_queries: 1,
            number_of_results_per_query: 1,
            max_research_loops: 2,
            max_page_chars: 20_000,
        }
    }
}

impl ResearchConfig {
    /// Override fields from the process environment. Variable names are the
    /// upper-cased field names, e.g. `MAX_RESEARCH_LOOPS`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`, which maps upper-cased field names to
    /// values.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
            raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: key.into(),
                message: format!("expected a non-negative integer, got '{raw}'"),
            })
        }

        if let Some(v) = lookup("QUERY_GENERATOR_MODEL") {
            self.query_generator_model = v;
        }
        if let Some(v) = lookup("REFLECTION_MODEL") {
            self.reflection_model = v;
        }
        if let Some(v) = lookup("ANSWER_MODEL") {
            self.answer_model = v;
        }
        if let Some(v) = lookup("ANALYSIS_MODEL") {
            self.analysis_model = v;
        }
        if let Some(v) = lookup("NUMBER_OF_INITIAL_QUERIES") {
            self.number_of_initial_queries = number("NUMBER_OF_INITIAL_QUERIES", &v)?;
        }
        if let Some(v) = lookup("NUMBER_OF_RESULTS_PER_QUERY") {
            self.number_of_results_per_query = number("NUMBER_OF_RESULTS_PER_QUERY", &v)?;
        }
        if let Some(v) = lookup("MAX_RESEARCH_LOOPS") {
            self.max_research_loops = number("MAX_RESEARCH_LOOPS", &v)?;
        }
        if let Some(v) = lookup("MAX_PAGE_CHARS") {
            self.max_page_chars = number("MAX_PAGE_CHARS", &v)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryConfig
// ---------------------------------------------------------------------------

/// Settings for the memory sub-graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub model_name: String,
    pub query_temperature: f32,
    /// Maximum items returned per memory read.
    pub read_limit: usize,
    /// Namespace user when neither the query nor the run names one.
    pub default_user: String,
    /// Summarize the access registry with a model after accessing memory.
    pub analyze_results: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            model_name: "openai".into(),
            query_temperature: 0.5,
            read_limit: 10,
            default_user: DEFAULT_USER.into(),
            analyze_results: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
