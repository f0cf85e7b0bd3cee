//! LLM provider implementations.
//!
//! Provides concrete implementations of the `LlmProvider` trait for
//! OpenAI-compatible APIs (OpenAI, Azure, Ollama, vLLM, LM Studio) plus the
//! in-process mock used for offline runs.
//!
//! Use `create_provider()` to instantiate the appropriate provider based on config.

pub mod openai_compat;

use crate::brain::{LlmProvider, MockLlmProvider};
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use openai_compat::OpenAiCompatibleProvider;

/// Create an LLM provider based on the configuration.
///
/// Supported provider names:
/// - `"openai"` (also `"ollama"`, `"azure"`, `"vllm"`): OpenAI chat completions format
/// - `"mock"`: canned responses, no network
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::debug!("Using mock LLM provider");
            Ok(Arc::new(MockLlmProvider::new()))
        }
        "openai" | "ollama" | "azure" | "vllm" | "lmstudio" => {
            let provider = OpenAiCompatibleProvider::new(config)?;
            Ok(Arc::new(provider))
        }
        other => Err(LlmError::ApiRequest {
            message: format!("Unsupported LLM provider '{other}'. Use 'openai' or 'mock'."),
        }),
    }
}
