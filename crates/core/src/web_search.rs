use crate::corpus::decode_entities;
use crate::traits::SearchProvider;
use crate::{IngestError, SearchError};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

pub const DUCKDUCKGO_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// Web search through DuckDuckGo's HTML results page.
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
    anchors: Regex,
    class_attr: Regex,
    href_attr: Regex,
    tags: Regex,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self, IngestError> {
        Self::with_endpoint(DUCKDUCKGO_HTML_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, IngestError> {
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            anchors: Regex::new(r"(?is)<a\s([^>]*)>(.*?)</a\s*>")?,
            class_attr: Regex::new(r#"(?i)class\s*=\s*"([^"]*)""#)?,
            href_attr: Regex::new(r#"(?i)href\s*=\s*"([^"]*)""#)?,
            tags: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    fn inline_text(&self, html: &str) -> String {
        let stripped = self.tags.replace_all(html, "");
        decode_entities(&stripped)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Title links open a result; the snippet anchor that follows fills it in.
    pub fn parse_results(&self, html: &str, max_results: usize) -> Vec<WebSearchResult> {
        let mut results: Vec<WebSearchResult> = Vec::new();
        let mut seen = HashSet::new();
        let mut current_is_open = false;

        for captures in self.anchors.captures_iter(html) {
            let attrs = captures.get(1).map_or("", |m| m.as_str());
            let inner = captures.get(2).map_or("", |m| m.as_str());
            let classes = self
                .class_attr
                .captures(attrs)
                .and_then(|c| c.get(1))
                .map_or("", |m| m.as_str());

            if has_class(classes, "result__a") {
                current_is_open = false;
                if results.len() >= max_results {
                    break;
                }

                let Some(link) = self
                    .href_attr
                    .captures(attrs)
                    .and_then(|c| c.get(1))
                    .and_then(|m| resolve_link(m.as_str()))
                else {
                    continue;
                };
                if !seen.insert(link.clone()) {
                    continue;
                }

                results.push(WebSearchResult {
                    title: self.inline_text(inner),
                    snippet: String::new(),
                    link,
                });
                current_is_open = true;
            } else if current_is_open && has_class(classes, "result__snippet") {
                if let Some(last) = results.last_mut() {
                    last.snippet = self.inline_text(inner);
                }
                current_is_open = false;
            }
        }

        results
    }
}

fn has_class(classes: &str, wanted: &str) -> bool {
    classes.split_whitespace().any(|class| class == wanted)
}

/// Unwraps DuckDuckGo redirect links to the target URL. Ad and internal
/// links resolve to `None`.
fn resolve_link(href: &str) -> Option<String> {
    let href = decode_entities(href);
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href
    };
    let url = Url::parse(&absolute).ok()?;

    let is_duckduckgo = url
        .host_str()
        .is_some_and(|host| host == "duckduckgo.com" || host.ends_with(".duckduckgo.com"));
    let target = if is_duckduckgo {
        let (_, target) = url.query_pairs().find(|(key, _)| key == "uddg")?;
        Url::parse(&target).ok()?
    } else {
        url
    };

    matches!(target.scheme(), "http" | "https").then(|| target.to_string())
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, subject: &str, max_results: usize) -> Result<Vec<WebSearchResult>, SearchError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(SearchError::Request("search subject is empty".to_string()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", subject)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "duckduckgo".to_string(),
                details: response.status().to_string(),
            });
        }

        let html = response.text().await?;
        let results = self.parse_results(&html, max_results);
        debug!(subject, results = results.len(), "web search");
        Ok(results)
    }
}
