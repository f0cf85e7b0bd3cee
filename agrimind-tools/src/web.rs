//! Web search through the DuckDuckGo instant answers API.
//!
//! No API key is needed. Results are the abstract (when DuckDuckGo has one),
//! related topics, and direct results, capped at `max_results`.

use agrimind_core::error::ToolError;
use agrimind_core::registry::{Tool, require_text_input};
use agrimind_core::types::ToolOutput;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Search the web using the DuckDuckGo instant answers API.
pub struct WebSearchTool {
    endpoint: String,
    timeout: Duration,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    /// Point the tool at a different instant-answer compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn failed(message: String) -> ToolError {
        ToolError::ExecutionFailed {
            name: "web_search".into(),
            message,
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract readable results from an instant-answer response body.
pub fn parse_instant_answer(body: &Value, max_results: usize) -> Vec<String> {
    let mut results = Vec::new();

    if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str())
        && !abstract_text.is_empty()
    {
        let source = body
            .get("AbstractSource")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown");
        let url = body
            .get("AbstractURL")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        results.push(format!("[{source}] {abstract_text}\n  URL: {url}"));
    }

    // Related topics may be grouped under {"Name": ..., "Topics": [...]}.
    let mut topics = Vec::new();
    if let Some(related) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
        for topic in related {
            match topic.get("Topics").and_then(|v| v.as_array()) {
                Some(group) => topics.extend(group.iter()),
                None => topics.push(topic),
            }
        }
    }
    if let Some(direct) = body.get("Results").and_then(|v| v.as_array()) {
        topics.extend(direct.iter());
    }

    for topic in topics {
        if results.len() >= max_results {
            break;
        }
        if let Some(text) = topic.get("Text").and_then(|v| v.as_str()) {
            let url = topic.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
            results.push(format!("- {text}\n  URL: {url}"));
        }
    }

    results.truncate(max_results);
    results
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information such as market prices, weather, news, \
         or government announcements. Returns snippets and URLs."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "The search query" },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5, max: 10)",
                    "default": 5
                }
            },
            "required": ["input"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let query = require_text_input(self.name(), &args)?;
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .clamp(1, 10) as usize;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("AgriMind/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Self::failed(format!("Failed to create HTTP client: {e}")))?;

        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.endpoint,
            urlencoding::encode(&query)
        );
        debug!(%url, "Web search request");

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::failed(format!("Search request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Self::failed(format!(
                "Search endpoint returned HTTP {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::failed(format!("Failed to parse search response: {e}")))?;

        let results = parse_instant_answer(&body, max_results);
        let content = if results.is_empty() {
            format!("No instant answers found for \"{query}\".")
        } else {
            format!(
                "Search results for \"{query}\":\n\n{}",
                results.join("\n\n")
            )
        };

        Ok(ToolOutput::text(content).with_metadata("results", serde_json::json!(results.len())))
    }
}
