//! Core type definitions for AgriMind.
//!
//! Defines the fundamental data structures shared by the router, the ReAct
//! agent, and the pipeline runner: messages, tool definitions and outputs,
//! LLM request/response shapes, and the fixed set of assistant capabilities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message exchanged with the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Create a new message with auto-generated ID and current timestamp.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Add metadata to this message.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A definition describing a tool for the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Output produced by a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolOutput {
    /// Create a simple text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry to the output.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// The fixed set of capabilities the assistant can dispatch a query to.
///
/// Each capability is backed by exactly one tool in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Knowledge-base retrieval over the agronomy corpus.
    Retrieval,
    /// Free-form text generation by the language model.
    Generation,
    /// Translation between languages.
    Translation,
    /// Numeric prediction (crop yield, irrigation need).
    Prediction,
    /// External web search.
    WebSearch,
}

impl Capability {
    /// All capabilities in declaration order.
    pub fn all() -> &'static [Capability] {
        &[
            Capability::Retrieval,
            Capability::Generation,
            Capability::Translation,
            Capability::Prediction,
            Capability::WebSearch,
        ]
    }

    /// Name of the tool that implements this capability.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Capability::Retrieval => "knowledge_search",
            Capability::Generation => "text_generate",
            Capability::Translation => "translate",
            Capability::Prediction => "crop_predict",
            Capability::WebSearch => "web_search",
        }
    }

    /// Human-readable name for logs and the CLI.
    pub fn display_name(&self) -> &'static str {
        match self {
            Capability::Retrieval => "Knowledge Retrieval",
            Capability::Generation => "Text Generation",
            Capability::Translation => "Translation",
            Capability::Prediction => "Prediction",
            Capability::WebSearch => "Web Search",
        }
    }

    /// Tie-break rank: lower wins when two capabilities score the same.
    ///
    /// More specific intents outrank general ones.
    pub fn specificity_rank(&self) -> u8 {
        match self {
            Capability::Translation => 0,
            Capability::Prediction => 1,
            Capability::WebSearch => 2,
            Capability::Generation => 3,
            Capability::Retrieval => 4,
        }
    }

    /// Resolve a capability from a tool name.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.tool_name() == name)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Retrieval => "retrieval",
            Capability::Generation => "generation",
            Capability::Translation => "translation",
            Capability::Prediction => "prediction",
            Capability::WebSearch => "web_search",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "retrieval" | "knowledge" => Ok(Capability::Retrieval),
            "generation" | "generate" => Ok(Capability::Generation),
            "translation" => Ok(Capability::Translation),
            "prediction" | "predict" => Ok(Capability::Prediction),
            "web_search" | "websearch" | "search" => Ok(Capability::WebSearch),
            other => Capability::from_tool_name(other)
                .ok_or_else(|| format!("unknown capability '{other}'")),
        }
    }
}

/// Token usage statistics from an LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// The result of an LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    /// The assistant's reply text.
    pub fn text(&self) -> &str {
        &self.message.content
    }
}

/// A request to the LLM for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub stop_sequences: Vec<String>,
    pub model: Option<String>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: None,
            stop_sequences: Vec::new(),
            model: None,
        }
    }
}

/// Truncate a string to at most `max_chars` characters, respecting UTF-8 boundaries.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
