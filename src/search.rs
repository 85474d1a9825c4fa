use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::settings::SearchConfig;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// The web-search capability the fallback ladder consumes. May be entirely
/// unavailable (no connectivity); callers degrade instead of failing.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn check_connectivity(&self) -> bool;

    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, ApiError>;
}

/// DuckDuckGo instant-answer search, no API key required.
#[derive(Debug, Clone)]
pub struct DdgSearch {
    client: Client,
    probe_url: String,
    connectivity_timeout: Duration,
}

impl DdgSearch {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            client: Client::new(),
            probe_url: config.connectivity_probe_url.clone(),
            connectivity_timeout: Duration::from_secs(config.connectivity_timeout_secs),
        }
    }
}

#[async_trait]
impl WebSearchProvider for DdgSearch {
    async fn check_connectivity(&self) -> bool {
        let reachable = self
            .client
            .get(&self.probe_url)
            .timeout(self.connectivity_timeout)
            .send()
            .await
            .is_ok();
        tracing::debug!(
            "Connectivity check against {}: {}",
            self.probe_url,
            if reachable { "online" } else { "offline" }
        );
        reachable
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ApiError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !response.status().is_success() {
            return Err(ApiError::Internal(format!(
                "DuckDuckGo search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::internal)?;
        let mut results = parse_ddg_payload(&payload);
        results.truncate(max_results);
        Ok(results)
    }
}

pub(crate) fn parse_ddg_payload(payload: &Value) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let (Some(abstract_text), Some(url)) = (
        payload.get("AbstractText").and_then(|v| v.as_str()),
        payload.get("AbstractURL").and_then(|v| v.as_str()),
    ) {
        if !abstract_text.is_empty() && !url.is_empty() {
            results.push(SearchResult {
                title: abstract_text
                    .split(" - ")
                    .next()
                    .unwrap_or(abstract_text)
                    .to_string(),
                url: url.to_string(),
                snippet: abstract_text.to_string(),
            });
        }
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        collect_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        collect_topics(items, &mut results);
    }

    results
}

fn collect_topics(items: &[Value], results: &mut Vec<SearchResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            collect_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(SearchResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}
