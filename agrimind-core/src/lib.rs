//! # AgriMind Core
//!
//! Core library for the AgriMind agricultural assistant.
//! Provides the tool router, the bounded ReAct agent, tool pipelines,
//! in-memory conversation history, the LLM interface (brain), configuration,
//! and fundamental types.

pub mod assistant;
pub mod brain;
pub mod config;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod providers;
pub mod react;
pub mod registry;
pub mod router;
pub mod types;

// Re-export commonly used types at the crate root.
pub use assistant::{Assistant, AssistantResponse, ResponseMode};
pub use brain::{Brain, LlmProvider, MockLlmProvider, ThinkOptions};
pub use config::{AssistantConfig, load_config};
pub use error::{AgriError, Result};
pub use history::{ConversationHistory, Turn};
pub use pipeline::{ErrorAction, Pipeline, PipelineResult, PipelineStep};
pub use providers::create_provider;
pub use react::{
    AgentCallback, NoOpCallback, ParsedOutput, ReactAgent, ReactConfig, ReactOutcome, ReactStep,
    RecordingCallback, Termination, parse_react_output,
};
pub use registry::{Tool, ToolRegistry, require_text_input, tool_args_from_text};
pub use router::{CapabilityScore, RouteDecision, ToolRouter};
pub use types::{
    Capability, CompletionRequest, CompletionResponse, Message, Role, TokenUsage, ToolDefinition,
    ToolOutput,
};
