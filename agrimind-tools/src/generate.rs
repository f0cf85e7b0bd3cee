//! Text generation tool backed by the configured LLM provider.

use agrimind_core::brain::{Brain, LlmProvider, ThinkOptions};
use agrimind_core::error::ToolError;
use agrimind_core::registry::{Tool, require_text_input};
use agrimind_core::types::{Message, ToolOutput};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const GENERATION_SYSTEM_PROMPT: &str = "You are AgriMind, an agricultural assistant for \
smallholder farmers. Answer in plain language with practical, field-level advice. When context \
passages are provided, base the answer on them and say so if they do not cover the question.";

/// Free-form generation: the input is sent to the model as the user prompt.
pub struct TextGenerateTool {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: Option<usize>,
    max_retries: usize,
    timeout: Duration,
}

impl TextGenerateTool {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            temperature: 0.7,
            max_tokens: None,
            max_retries: 2,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for TextGenerateTool {
    fn name(&self) -> &str {
        "text_generate"
    }

    fn description(&self) -> &str {
        "Generate text with the language model: explanations, summaries, letters, plans, \
         or an answer written from supplied context. Input is the full prompt."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "The prompt to complete" },
                "temperature": { "type": "number", "description": "Sampling temperature override" },
                "max_tokens": { "type": "integer", "description": "Maximum tokens to generate" }
            },
            "required": ["input"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let prompt = require_text_input(self.name(), &args)?;
        let options = ThinkOptions {
            temperature: Some(
                args.get("temperature")
                    .and_then(|v| v.as_f64())
                    .map(|t| t as f32)
                    .unwrap_or(self.temperature),
            ),
            max_tokens: args
                .get("max_tokens")
                .and_then(|v| v.as_u64())
                .map(|n| n as usize)
                .or(self.max_tokens),
            stop_sequences: Vec::new(),
        };

        let mut brain = Brain::new(Arc::clone(&self.provider), GENERATION_SYSTEM_PROMPT);
        let response = brain
            .think_with_retry(&[Message::user(prompt)], &options, self.max_retries)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;

        let text = response.text().trim().to_string();
        debug!(chars = text.len(), model = %response.model, "Generated text");
        Ok(ToolOutput::text(text)
            .with_metadata("model", serde_json::json!(response.model))
            .with_metadata("output_tokens", serde_json::json!(response.usage.output_tokens)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrimind_core::brain::MockLlmProvider;
    use agrimind_core::error::LlmError;
    use agrimind_core::types::Role;

    #[tokio::test]
    async fn test_generate_returns_model_text() {
        let mock = Arc::new(MockLlmProvider::with_responses(["  Mulch keeps soil moist.  "]));
        let tool = TextGenerateTool::new(mock.clone()).with_max_tokens(256);
        let output = tool
            .execute(serde_json::json!({"input": "Why mulch?"}))
            .await
            .unwrap();
        assert_eq!(output.content, "Mulch keeps soil moist.");

        let requests = mock.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[1].content, "Why mulch?");
        assert_eq!(requests[0].max_tokens, Some(256));
        assert!((requests[0].temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_generate_temperature_override() {
        let mock = Arc::new(MockLlmProvider::with_responses(["ok"]));
        let tool = TextGenerateTool::new(mock.clone());
        tool.execute(serde_json::json!({"input": "hi", "temperature": 0.1}))
            .await
            .unwrap();
        assert!((mock.recorded_requests()[0].temperature - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_generate_maps_llm_error() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::AuthFailed {
            provider: "openai".into(),
        });
        let tool = TextGenerateTool::new(mock);
        let err = tool
            .execute(serde_json::json!({"input": "hello"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("Authentication failed"));
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_prompt() {
        let tool = TextGenerateTool::new(Arc::new(MockLlmProvider::new()));
        let err = tool
            .execute(serde_json::json!({"input": "   "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
