//! `reqwest`-based page fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::traits::WebFetch;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Fetches pages over HTTP and reduces HTML to plain text.
///
/// Network failures and error statuses are reported as
/// `"Error fetching URL {url}: {reason}"` text rather than errors.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Fetcher with browser-like headers and a 15 second timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn try_fetch(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        Ok(html_to_text(&body))
    }
}

#[async_trait]
impl WebFetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> String {
        match self.try_fetch(url).await {
            Ok(text) => {
                debug!(url, chars = text.len(), "fetched page");
                text
            }
            Err(e) => {
                warn!(url, error = %e, "page fetch failed");
                format!("Error fetching URL {url}: {e}")
            }
        }
    }
}

/// Elements whose text is never page content.
const SKIPPED_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// Text of the document body with scripts and styles dropped and whitespace
/// collapsed. Entities are decoded by the parser.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut body = document.root_element();
    if let Ok(selector) = Selector::parse("body") {
        if let Some(found) = document.select(&selector).next() {
            body = found;
        }
    }
    let mut words = Vec::new();
    collect_words(body, &mut words);
    words.join(" ")
}

fn collect_words<'a>(element: ElementRef<'a>, words: &mut Vec<&'a str>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if !SKIPPED_ELEMENTS.contains(&child_element.value().name()) {
                collect_words(child_element, words);
            }
        } else if let Some(text) = child.value().as_text() {
            words.extend(text.split_whitespace());
        }
    }
}
