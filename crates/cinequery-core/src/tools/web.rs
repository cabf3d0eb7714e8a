//! Open web search tool over the DuckDuckGo HTML endpoint.
//!
//! No API key required; results are extracted from the HTML result list and
//! snippets flattened to plain text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::SetupError;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "cinequery/0.4 (+https://github.com/cinequery/cinequery)";

pub struct WebSearch {
    http: reqwest::Client,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl WebSearch {
    pub fn new() -> Result<Self, SetupError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Value, String> {
        debug!(query, limit, "web search");

        let response = self
            .http
            .get(SEARCH_ENDPOINT)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("web search request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("web search returned HTTP {status}"));
        }

        let html = response
            .text()
            .await
            .map_err(|e| format!("web search response unreadable: {e}"))?;

        let hits = parse_results(&html, limit)?;
        serde_json::to_value(hits).map_err(|e| format!("failed to serialize hits: {e}"))
    }
}

/// Pull result title/URL/snippet out of the result list markup.
fn parse_results(html: &str, limit: usize) -> Result<Vec<WebHit>, String> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let result_selector =
        Selector::parse("div.result").map_err(|e| format!("selector error: {e}"))?;
    let link_selector =
        Selector::parse("a.result__a").map_err(|e| format!("selector error: {e}"))?;
    let snippet_selector =
        Selector::parse(".result__snippet").map_err(|e| format!("selector error: {e}"))?;

    let mut hits = Vec::new();
    for result in document.select(&result_selector) {
        let Some(link) = result.select(&link_selector).next() else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        let url = link.value().attr("href").unwrap_or("").to_string();
        let snippet = result
            .select(&snippet_selector)
            .next()
            .map(|el| flatten_html(&el.html()))
            .unwrap_or_default();

        if title.is_empty() {
            continue;
        }
        hits.push(WebHit {
            title,
            url,
            snippet,
        });
        if hits.len() >= limit {
            break;
        }
    }
    Ok(hits)
}

/// Snippets carry inline markup (highlighted terms); flatten to one line of
/// plain text.
fn flatten_html(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 200)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
