//! Web search tool using the Brave Search API.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;

use crate::tools::error::ToolError;
use crate::tools::tool::Tool;

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const RESULT_COUNT: usize = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Web search backed by Brave Search. Body is the query.
pub struct WebSearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: BRAVE_SEARCH_URL.to_string(),
        }
    }

    /// Point the tool at a different search endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Body: the search query."
    }

    async fn execute(&self, body: &str) -> Result<String, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::NotConfigured("web search API key".to_string()))?;

        let query = body.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidInput("empty query".to_string()));
        }

        let count = RESULT_COUNT.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "search failed: {}",
                response.status()
            )));
        }

        let data: BraveResponse = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("bad search response: {e}")))?;

        Ok(format_results(query, &data))
    }
}

fn format_results(query: &str, data: &BraveResponse) -> String {
    let results = data.web.as_ref().map(|w| w.results.as_slice()).unwrap_or(&[]);
    if results.is_empty() {
        return format!("No results for: {query}");
    }

    let mut output = format!("Search results for: {query}\n\n");
    for (i, item) in results.iter().take(RESULT_COUNT).enumerate() {
        let _ = writeln!(
            output,
            "{}. {}\n   URL: {}\n   {}\n",
            i + 1,
            item.title,
            item.url,
            item.description
        );
    }
    output
}

// ============================================================================
// Private Types
// ============================================================================

#[derive(serde::Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(serde::Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(serde::Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}
