//! Error types for the AgriMind core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering LLM, tool execution, routing, agent loop, pipeline, and configuration domains.

use std::path::PathBuf;

/// Top-level error type for the AgriMind core library.
#[derive(Debug, thiserror::Error)]
pub enum AgriError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Routing error: {0}")]
    Router(#[from] RouterError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Context window exceeded: used {used} of {limit} tokens")]
    ContextOverflow { used: usize, limit: usize },
}

/// Errors from tool registration and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

/// Errors from the tool router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Cannot route an empty query")]
    EmptyQuery,
}

/// Errors from the ReAct agent loop.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Cannot run the agent on an empty task")]
    EmptyTask,

    #[error("Could not parse model output: {message}")]
    ParseFailure { message: String },
}

/// Errors from pipeline definition and execution.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline '{name}' has no steps")]
    EmptyPipeline { name: String },

    #[error("Pipeline not found: {name}")]
    NotFound { name: String },

    #[error("Duplicate step id '{id}'")]
    DuplicateStep { id: String },

    #[error("Step '{step}' references unknown tool '{tool}'")]
    UnknownTool { step: String, tool: String },

    #[error("Template error: {message}")]
    TemplateError { message: String },

    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("Pipeline definition parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `AgriError`.
pub type Result<T> = std::result::Result<T, AgriError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = AgriError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_tool() {
        let err = AgriError::Tool(ToolError::NotFound {
            name: "soil_scanner".into(),
        });
        assert_eq!(err.to_string(), "Tool error: Tool not found: soil_scanner");
    }

    #[test]
    fn test_error_display_router() {
        let err: AgriError = RouterError::EmptyQuery.into();
        assert_eq!(err.to_string(), "Routing error: Cannot route an empty query");
    }

    #[test]
    fn test_error_display_pipeline() {
        let err = AgriError::Pipeline(PipelineError::UnknownTool {
            step: "answer".into(),
            tool: "oracle".into(),
        });
        assert_eq!(
            err.to_string(),
            "Pipeline error: Step 'answer' references unknown tool 'oracle'"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AgriError = io_err.into();
        assert!(matches!(err, AgriError::Io(_)));
    }

    #[test]
    fn test_tool_timeout_display() {
        let err = ToolError::Timeout {
            name: "web_search".into(),
            timeout_secs: 15,
        };
        assert_eq!(err.to_string(), "Tool 'web_search' timed out after 15s");
    }
}
