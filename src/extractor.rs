use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};

use crate::core::config::settings::SearchConfig;

/// Returned when extraction across every input produced nothing. Downstream
/// logic treats this string specially: it is never embedded as content and
/// always routes to the fallback ladder.
pub const NO_CONTENT_SENTINEL: &str = "No content extracted from the provided inputs.";

/// An uploaded document, already decoded at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct DocumentBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Normalizes heterogeneous sources (web pages, PDFs) into plain text.
///
/// A failure on one item produces an inline error string for that item only;
/// the batch always completes.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    client: Client,
    fetch_timeout: Duration,
}

impl ContentExtractor {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            client: Client::new(),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    /// Extract all inputs into one newline-joined text. Empty overall output
    /// maps to [`NO_CONTENT_SENTINEL`].
    pub async fn extract(&self, url_input: &str, documents: &[DocumentBlob]) -> String {
        let mut parts: Vec<String> = Vec::new();

        for url in url_input.split(',') {
            let url = url.trim();
            if url.starts_with("http") {
                parts.push(self.readable_content(url).await);
            }
        }

        for doc in documents {
            parts.push(extract_pdf_text(doc));
        }

        let content = parts.join("\n").trim().to_string();
        if content.is_empty() {
            NO_CONTENT_SENTINEL.to_string()
        } else {
            content
        }
    }

    /// Fetch a URL and reduce it to readable main-content text.
    pub async fn readable_content(&self, url: &str) -> String {
        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        let body = match response {
            Ok(resp) => match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    tracing::debug!("Error reading body from {}: {}", url, err);
                    return format!("Error fetching content: {}", err);
                }
            },
            Err(err) => {
                tracing::debug!("Error fetching content from {}: {}", url, err);
                return format!("Error fetching content: {}", err);
            }
        };

        extract_readable_text(&body)
    }
}

/// Reduce an HTML document to its readable main content: boilerplate
/// elements are dropped, a main-content region is preferred over the whole
/// body, and whitespace is collapsed.
pub fn extract_readable_text(html: &str) -> String {
    let boilerplate = Selector::parse("script, style, nav, header, footer, aside, noscript, iframe")
        .expect("valid selector");
    let main_content =
        Selector::parse("main, article, #content, .content").expect("valid selector");
    let body = Selector::parse("body").expect("valid selector");

    let mut document = Html::parse_document(html);
    let unwanted: Vec<_> = document.select(&boilerplate).map(|el| el.id()).collect();
    for node_id in unwanted {
        if let Some(mut node) = document.tree.get_mut(node_id) {
            node.detach();
        }
    }

    let region = document
        .select(&main_content)
        .next()
        .or_else(|| document.select(&body).next());

    let text = match region {
        Some(el) => el.text().collect::<Vec<_>>().join(" "),
        None => document.root_element().text().collect::<Vec<_>>().join(" "),
    };

    collapse_whitespace(&text)
}

fn extract_pdf_text(doc: &DocumentBlob) -> String {
    match pdf_extract::extract_text_from_mem(&doc.bytes) {
        Ok(text) => collapse_whitespace(&text),
        Err(err) => {
            tracing::debug!("Error reading PDF {}: {}", doc.name, err);
            format!("Error reading PDF: {}", err)
        }
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let re = WS.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    re.replace_all(text, " ").trim().to_string()
}
