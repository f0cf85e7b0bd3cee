//! Integration tests for the assistant running over the real capability tools.
//!
//! The LLM is always the mock provider; knowledge search, crop prediction,
//! and the pipeline/agent plumbing run for real.

use agrimind_core::assistant::{Assistant, ResponseMode};
use agrimind_core::brain::MockLlmProvider;
use agrimind_core::config::AssistantConfig;
use agrimind_core::registry::ToolRegistry;
use agrimind_core::types::Capability;
use agrimind_tools::register_builtin_tools;
use std::sync::Arc;
use tempfile::TempDir;

fn corpus() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("wheat.md"),
        "# Wheat\n\nTimely sowing of wheat is between 1 and 15 November in north India.\n\n\
         Yellow rust is controlled by spraying propiconazole 0.1%.",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("rice.txt"),
        "Rice nurseries should be raised 25 days before transplanting.",
    )
    .unwrap();
    dir
}

fn assistant(mock: Arc<MockLlmProvider>, knowledge_dir: Option<&TempDir>) -> Assistant {
    let mut config = AssistantConfig::default();
    config.tools.knowledge_dir = knowledge_dir.map(|d| d.path().to_path_buf());
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, mock.clone(), &config);
    Assistant::new(config, mock, registry)
}

// ── Retrieval → rag_answer pipeline ──────────────────────────────────────

#[tokio::test]
async fn test_retrieval_query_answers_from_corpus() {
    let dir = corpus();
    let mock = Arc::new(MockLlmProvider::with_responses([
        "Sow wheat between 1 and 15 November.",
    ]));
    let mut assistant = assistant(mock.clone(), Some(&dir));

    let response = assistant.handle("When should I sow wheat?").await.unwrap();
    assert_eq!(response.route.capability, Capability::Retrieval);
    assert_eq!(response.mode, ResponseMode::Pipeline);
    assert_eq!(response.answer, "Sow wheat between 1 and 15 November.");

    let trace = response.pipeline.unwrap();
    assert!(trace.steps[0].output.as_deref().unwrap().contains("wheat.md"));

    // The generation prompt carries the retrieved passage and the question.
    let requests = mock.recorded_requests();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].messages.last().unwrap().content;
    assert!(prompt.contains("1 and 15 November"));
    assert!(prompt.contains("When should I sow wheat?"));
}

// ── Direct dispatch ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_prediction_runs_without_llm() {
    let mock = Arc::new(MockLlmProvider::new());
    let mut assistant = assistant(mock.clone(), None);

    let response = assistant
        .handle("Predict maize yield with rainfall 650 mm")
        .await
        .unwrap();
    assert_eq!(response.mode, ResponseMode::Direct);
    assert_eq!(response.route.capability, Capability::Prediction);
    assert!(response.answer.starts_with("Predicted yield: "));
    assert!(response.answer.contains("rainfall_mm=650,"));
    assert!(mock.recorded_requests().is_empty());
}

#[tokio::test]
async fn test_translation_strips_instruction() {
    let mock = Arc::new(MockLlmProvider::with_responses(["सुप्रभात किसानों"]));
    let mut assistant = assistant(mock.clone(), None);

    let response = assistant
        .handle("Translate 'good morning, farmers' into Hindi")
        .await
        .unwrap();
    assert_eq!(response.mode, ResponseMode::Direct);
    assert_eq!(response.route.capability, Capability::Translation);
    assert_eq!(response.answer, "सुप्रभात किसानों");

    let request = &mock.recorded_requests()[0];
    assert!(request.messages[0].content.contains("into Hindi"));
    assert_eq!(request.messages[1].content, "good morning, farmers");
}

// ── Escalation and agent mode ────────────────────────────────────────────

#[tokio::test]
async fn test_prediction_without_features_escalates() {
    let mock = Arc::new(MockLlmProvider::with_responses([
        "Thought: The farmer gave no measurements.\nFinal Answer: Please share rainfall and soil moisture.",
    ]));
    let mut assistant = assistant(mock, None);

    let response = assistant.handle("Predict my harvest yield").await.unwrap();
    assert!(response.escalated);
    assert_eq!(response.mode, ResponseMode::Agent);
    assert_eq!(response.answer, "Please share rainfall and soil moisture.");
}

#[tokio::test]
async fn test_agent_chains_real_predictions() {
    let mock = Arc::new(MockLlmProvider::with_responses([
        "Thought: Start with the dry case.\nAction: crop_predict\nAction Input: {\"rainfall_mm\": 400}",
        "Thought: Now the wet case.\nAction: crop_predict\nAction Input: {\"rainfall_mm\": 900}",
        "Thought: I now know the final answer\nFinal Answer: 900 mm gives the higher yield.",
    ]));
    let mut assistant = assistant(mock, None);

    let response = assistant
        .handle("Compare the expected yield with rainfall 400 mm and then with 900 mm")
        .await
        .unwrap();
    assert_eq!(response.mode, ResponseMode::Agent);
    assert_eq!(response.iterations, 3);
    assert_eq!(response.answer, "900 mm gives the higher yield.");

    let observations: Vec<&str> = response
        .steps
        .iter()
        .filter_map(|s| s.observation.as_deref())
        .collect();
    assert_eq!(observations.len(), 2);
    assert!(observations[0].contains("rainfall_mm=400,"));
    assert!(observations[1].contains("rainfall_mm=900,"));
    assert!(response.steps.iter().all(|s| !s.is_error));
}

#[tokio::test]
async fn test_translated_answer_pipeline() {
    let dir = corpus();
    let mock = Arc::new(MockLlmProvider::with_responses([
        "Spray propiconazole 0.1% for yellow rust.",
        "पीले रतुआ के लिए प्रोपिकोनाज़ोल 0.1% छिड़कें।",
    ]));
    let assistant = assistant(mock.clone(), Some(&dir));

    let result = assistant
        .run_pipeline(
            "translated_answer",
            "How do I control yellow rust?",
            &Default::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.output, "पीले रतुआ के लिए प्रोपिकोनाज़ोल 0.1% छिड़कें।");

    let requests = mock.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].messages[0].content.contains("into Hindi"));
    assert_eq!(
        requests[1].messages[1].content,
        "Spray propiconazole 0.1% for yellow rust."
    );
}

#[tokio::test]
async fn test_translated_answer_pipeline_with_unlisted_language() {
    let dir = corpus();
    let mock = Arc::new(MockLlmProvider::with_responses([
        "Spray propiconazole 0.1%: repeat after 15 days.",
        "プロピコナゾール0.1%を散布し、15日後に繰り返す。",
    ]));
    let assistant = assistant(mock.clone(), Some(&dir));

    let vars = std::collections::HashMap::from([("language".to_string(), "Japanese".to_string())]);
    let result = assistant
        .run_pipeline("translated_answer", "How do I control yellow rust?", &vars)
        .await
        .unwrap();
    let translate = &result.steps[2];
    assert_eq!(translate.tool, "translate");

    let requests = mock.recorded_requests();
    assert!(requests[1].messages[0].content.contains("into Japanese"));
    assert_eq!(
        requests[1].messages[1].content,
        "Spray propiconazole 0.1%: repeat after 15 days."
    );
}
