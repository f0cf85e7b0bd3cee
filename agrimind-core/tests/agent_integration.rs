//! Integration tests for the AgriMind assistant.
//!
//! These tests exercise routing, direct dispatch, pipelines, and the ReAct
//! loop end-to-end using MockLlmProvider and in-process stand-in tools.

use agrimind_core::assistant::{Assistant, ResponseMode};
use agrimind_core::brain::MockLlmProvider;
use agrimind_core::config::AssistantConfig;
use agrimind_core::error::ToolError;
use agrimind_core::react::{RecordingCallback, Termination};
use agrimind_core::registry::{Tool, ToolRegistry, require_text_input};
use agrimind_core::types::{Capability, ToolOutput};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Echoes its arguments so tests can see exactly what the orchestrator sent.
struct ArgsEchoTool {
    name: &'static str,
}

#[async_trait]
impl Tool for ArgsEchoTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Echo the arguments"
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(format!("{}({})", self.name, args)))
    }
}

/// A knowledge base with a single fact.
struct FactTool;

#[async_trait]
impl Tool for FactTool {
    fn name(&self) -> &str {
        "knowledge_search"
    }

    fn description(&self) -> &str {
        "Search the agronomy knowledge base"
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let query = require_text_input("knowledge_search", &args)?;
        if query.to_lowercase().contains("wheat") {
            Ok(ToolOutput::text(
                "[1] Wheat: sow between 1 and 15 November in north India.",
            ))
        } else {
            Ok(ToolOutput::text("No relevant passages found."))
        }
    }
}

fn full_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FactTool)).unwrap();
    for name in ["text_generate", "translate", "crop_predict", "web_search"] {
        registry.register(Arc::new(ArgsEchoTool { name })).unwrap();
    }
    registry
}

fn mock(responses: &[&str]) -> Arc<MockLlmProvider> {
    Arc::new(MockLlmProvider::with_responses(responses.iter().copied()))
}

#[tokio::test]
async fn test_prediction_query_dispatches_directly_with_input_arg() {
    let mut assistant = Assistant::new(AssistantConfig::default(), mock(&[]), full_registry());
    let response = assistant
        .handle("Predict maize yield with rainfall 650 mm")
        .await
        .unwrap();

    assert_eq!(response.mode, ResponseMode::Direct);
    assert_eq!(response.route.capability, Capability::Prediction);
    assert_eq!(
        response.answer,
        r#"crop_predict({"input":"Predict maize yield with rainfall 650 mm"})"#
    );
}

#[tokio::test]
async fn test_agent_passes_json_action_input_through() {
    let provider = mock(&[
        "Thought: I have the numbers.\nAction: crop_predict\nAction Input: {\"rainfall_mm\": 300, \"soil_moisture_pct\": 12}",
        "Final Answer: Irrigate this week.",
    ]);
    let callback = Arc::new(RecordingCallback::new());
    let mut assistant = Assistant::new(AssistantConfig::default(), provider, full_registry())
        .with_callback(callback.clone());

    let response = assistant
        .handle("Should I irrigate? Also compare with last season.")
        .await
        .unwrap();

    assert_eq!(response.mode, ResponseMode::Agent);
    let observation = response.steps[0].observation.clone().unwrap();
    assert_eq!(
        observation,
        r#"crop_predict({"rainfall_mm":300,"soil_moisture_pct":12})"#
    );
    assert_eq!(callback.tool_calls().await, vec!["crop_predict"]);
    assert_eq!(callback.thoughts().await, vec!["I have the numbers."]);
}

#[tokio::test]
async fn test_history_flows_into_agent_prompt() {
    let provider = mock(&["Final Answer: Use 120 kg N/ha, split in three doses."]);
    let mut assistant =
        Assistant::new(AssistantConfig::default(), provider.clone(), full_registry());

    // First turn goes through the RAG pipeline (no LLM call from the stand-in tools).
    assistant.handle("When should I sow wheat?").await.unwrap();
    assert_eq!(assistant.history().len(), 1);

    // Second turn chains intents, so the agent sees the previous exchange.
    assistant
        .handle("What fertilizer should I use, then how much?")
        .await
        .unwrap();

    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].messages[1].content;
    assert!(prompt.contains("User: When should I sow wheat?"));
    assert!(prompt.contains("Question: What fertilizer should I use, then how much?"));
}

#[tokio::test]
async fn test_agent_budget_exhaustion_returns_partial_answer() {
    let mut config = AssistantConfig::default();
    config.agent.max_iterations = 2;
    let provider = mock(&[
        "Action: knowledge_search\nAction Input: wheat sowing",
        "Action: knowledge_search\nAction Input: wheat sowing window",
    ]);
    let mut assistant = Assistant::new(config, provider, full_registry());

    let response = assistant
        .handle("Compare wheat and barley sowing dates")
        .await
        .unwrap();

    assert_eq!(response.mode, ResponseMode::Agent);
    assert_eq!(response.iterations, 2);
    assert_eq!(
        response.answer,
        "[1] Wheat: sow between 1 and 15 November in north India."
    );
    assert!(response.steps.iter().all(|s| !s.is_error));
}

#[tokio::test]
async fn test_history_is_capped() {
    let mut config = AssistantConfig::default();
    config.history.max_turns = 2;
    let mut assistant = Assistant::new(config, mock(&[]), full_registry());

    for query in [
        "Write a poem about rain",
        "Write a poem about soil",
        "Write a poem about seeds",
    ] {
        assistant.handle(query).await.unwrap();
    }

    let history = assistant.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.total_turns_seen(), 3);
    assert_eq!(history.recent(1)[0].user, "Write a poem about seeds");
}

#[tokio::test]
async fn test_pipeline_definition_files_are_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("advisory.toml");
    std::fs::write(
        &path,
        r#"
name = "advisory"
description = "Prediction followed by a plain-language explanation"

[[steps]]
id = "predict"
tool = "crop_predict"
input = "{{ input }}"

[[steps]]
id = "explain"
tool = "text_generate"
input = "Explain for a farmer: {{ steps.predict }}"
"#,
    )
    .unwrap();

    let mut config = AssistantConfig::default();
    config.pipeline.definition_files = vec![path, dir.path().join("missing.toml")];
    let assistant = Assistant::new(config, mock(&[]), full_registry());

    let names: Vec<&str> = assistant.pipelines().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["advisory", "rag_answer", "translated_answer"]);

    let result = assistant
        .run_pipeline("advisory", "rainfall 400 mm", &HashMap::new())
        .await
        .unwrap();
    assert_eq!(result.steps.len(), 2);
    assert!(result.output.starts_with("text_generate("));
    assert!(result.output.contains("crop_predict"));
}

#[tokio::test]
async fn test_react_agent_standalone_reports_termination() {
    use agrimind_core::history::ConversationHistory;
    use agrimind_core::react::{ReactAgent, ReactConfig};

    let provider = mock(&["Thought: easy\nFinal Answer: Yes."]);
    let agent = ReactAgent::new(provider, Arc::new(full_registry()), ReactConfig::default());
    let outcome = agent
        .run("Is jowar drought tolerant?", &ConversationHistory::new(4))
        .await
        .unwrap();
    assert_eq!(outcome.termination, Termination::FinalAnswer);
    assert_eq!(outcome.answer, "Yes.");
    assert_eq!(outcome.steps[0].thought, "easy");
}
