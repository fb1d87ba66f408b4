//! In-process web search and fetch boundaries.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::CapabilityError;
use crate::traits::{WebFetch, WebSearch};
use crate::types::SearchHit;

/// Web search that never finds anything.
pub struct NoopWebSearch;

#[async_trait]
impl WebSearch for NoopWebSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, CapabilityError> {
        Ok(Vec::new())
    }
}

/// Web search answering from a fixed query → hits table.
#[derive(Default)]
pub struct StaticWebSearch {
    results: HashMap<String, Vec<SearchHit>>,
}

impl StaticWebSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hit for `query`. Hits keep registration order.
    pub fn with_hit(mut self, query: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        self.results.entry(query.into()).or_default().push(SearchHit {
            title: title.into(),
            url: url.into(),
            snippet: String::new(),
        });
        self
    }
}

#[async_trait]
impl WebSearch for StaticWebSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CapabilityError> {
        Ok(self
            .results
            .get(query)
            .map(|hits| hits.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Page fetcher answering from a fixed URL → text table.
#[derive(Default)]
pub struct StaticWebFetch {
    pages: HashMap<String, String>,
}

impl StaticWebFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }
}

#[async_trait]
impl WebFetch for StaticWebFetch {
    async fn fetch(&self, url: &str) -> String {
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| format!("Error fetching URL {url}: not found"))
    }
}
