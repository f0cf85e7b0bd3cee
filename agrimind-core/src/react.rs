//! ReAct agent: a bounded Thought/Action/Observation loop over the tool registry.
//!
//! Each iteration asks the LLM for the next step in the text format below,
//! runs at most one tool, and feeds the observation back into the scratchpad.
//! The loop ends when the model emits `Final Answer:` or the iteration budget
//! runs out, in which case the best partial answer is returned.
//!
//! ```text
//! Thought: I need the recommended sowing window.
//! Action: knowledge_search
//! Action Input: wheat sowing time Punjab
//! Observation: <tool output>
//! ...
//! Final Answer: Sow between 1 and 15 November.
//! ```
//!
//! Tool failures never abort the loop; they become `Error: ...` observations.
//! LLM failures do abort it, after the brain's own retries.

use crate::brain::{Brain, LlmProvider, ThinkOptions};
use crate::config::AssistantConfig;
use crate::error::{AgentError, AgriError};
use crate::history::ConversationHistory;
use crate::registry::{ToolRegistry, tool_args_from_text};
use crate::types::{Message, TokenUsage, truncate_chars};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Stop sequence that keeps the model from inventing its own observations.
pub const OBSERVATION_STOP: &str = "\nObservation:";

const FINAL_ANSWER_MARKER: &str = "Final Answer:";
const ACTION_MARKER: &str = "Action:";
const ACTION_INPUT_MARKER: &str = "Action Input:";
const OBSERVATION_MARKER: &str = "Observation:";
const THOUGHT_MARKER: &str = "Thought:";

const FORMAT_REMINDER: &str = "Invalid format. Reply with 'Action:' and 'Action Input:' lines to use a tool, or with 'Final Answer:' followed by your answer.";

/// Settings for one agent run.
#[derive(Debug, Clone)]
pub struct ReactConfig {
    /// Hard cap on iterations (0 is treated as 1).
    pub max_iterations: usize,
    /// Observations are truncated to this many characters.
    pub max_observation_chars: usize,
    pub temperature: f32,
    /// Retries for transient LLM errors within one iteration.
    pub max_retries: usize,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_observation_chars: 1200,
            temperature: 0.2,
            max_retries: 2,
        }
    }
}

impl ReactConfig {
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations,
            max_observation_chars: config.agent.max_observation_chars,
            temperature: config.agent.temperature,
            max_retries: config.llm.max_retries,
        }
    }

    fn effective_max_iterations(&self) -> usize {
        self.max_iterations.max(1)
    }
}

/// One step of model output, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutput {
    /// The model produced its answer.
    Final { thought: String, answer: String },
    /// The model wants to run a tool.
    Action {
        thought: String,
        tool: String,
        input: String,
    },
    /// Neither marker was found (or the action named no tool).
    Unstructured(String),
}

/// Parse a ReAct-formatted completion.
///
/// `Final Answer:` takes precedence over `Action:` when both appear.
pub fn parse_react_output(text: &str) -> ParsedOutput {
    if let Some(pos) = text.rfind(FINAL_ANSWER_MARKER) {
        let answer = text[pos + FINAL_ANSWER_MARKER.len()..].trim();
        if !answer.is_empty() {
            let first_marker = [text.find(ACTION_MARKER), text.find(FINAL_ANSWER_MARKER)]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(pos);
            return ParsedOutput::Final {
                thought: clean_thought(&text[..first_marker]),
                answer: answer.to_string(),
            };
        }
    }

    if let Some(pos) = text.find(ACTION_MARKER) {
        let after = &text[pos + ACTION_MARKER.len()..];
        let tool = clean_tool_name(after.lines().next().unwrap_or(""));
        if tool.is_empty() {
            return ParsedOutput::Unstructured(text.trim().to_string());
        }
        let input = match after.find(ACTION_INPUT_MARKER) {
            Some(input_pos) => {
                let rest = &after[input_pos + ACTION_INPUT_MARKER.len()..];
                let end = rest.find(OBSERVATION_MARKER).unwrap_or(rest.len());
                strip_code_fences(rest[..end].trim())
            }
            None => String::new(),
        };
        return ParsedOutput::Action {
            thought: clean_thought(&text[..pos]),
            tool,
            input,
        };
    }

    ParsedOutput::Unstructured(text.trim().to_string())
}

fn clean_thought(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix(THOUGHT_MARKER)
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

fn clean_tool_name(line: &str) -> String {
    line.trim()
        .trim_matches(|c: char| matches!(c, '`' | '[' | ']' | '"' | '\'' | '*' | '(' | ')'))
        .trim()
        .to_string()
}

fn strip_code_fences(text: &str) -> String {
    let Some(body) = text.strip_prefix("```") else {
        return text.to_string();
    };
    // Drop the language tag line (```json) if present.
    let body = match body.find('\n') {
        Some(nl) => &body[nl + 1..],
        None => body,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub input: String,
}

/// One iteration of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactStep {
    pub iteration: usize,
    pub thought: String,
    pub action: Option<ToolInvocation>,
    pub observation: Option<String>,
    pub is_error: bool,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    FinalAnswer,
    IterationBudgetExhausted,
}

/// Result of an agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactOutcome {
    pub answer: String,
    pub steps: Vec<ReactStep>,
    pub iterations: usize,
    pub termination: Termination,
    pub usage: TokenUsage,
}

/// Progress notifications from the agent loop.
#[async_trait]
pub trait AgentCallback: Send + Sync {
    async fn on_iteration_start(&self, _iteration: usize, _max_iterations: usize) {}

    async fn on_thought(&self, _thought: &str) {}

    async fn on_tool_start(&self, _tool: &str, _args: &serde_json::Value) {}

    async fn on_tool_result(&self, _tool: &str, _observation: &str, _is_error: bool, _duration_ms: u64) {
    }

    async fn on_final_answer(&self, _answer: &str) {}
}

/// A callback that ignores everything.
pub struct NoOpCallback;

#[async_trait]
impl AgentCallback for NoOpCallback {}

/// A callback that records events, for tests and the CLI's verbose mode.
#[derive(Default)]
pub struct RecordingCallback {
    iterations: tokio::sync::Mutex<Vec<usize>>,
    thoughts: tokio::sync::Mutex<Vec<String>>,
    tool_calls: tokio::sync::Mutex<Vec<String>>,
    tool_results: tokio::sync::Mutex<Vec<(String, bool)>>,
    final_answers: tokio::sync::Mutex<Vec<String>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn iterations(&self) -> Vec<usize> {
        self.iterations.lock().await.clone()
    }

    pub async fn thoughts(&self) -> Vec<String> {
        self.thoughts.lock().await.clone()
    }

    pub async fn tool_calls(&self) -> Vec<String> {
        self.tool_calls.lock().await.clone()
    }

    /// `(tool, is_error)` per completed tool run.
    pub async fn tool_results(&self) -> Vec<(String, bool)> {
        self.tool_results.lock().await.clone()
    }

    pub async fn final_answers(&self) -> Vec<String> {
        self.final_answers.lock().await.clone()
    }
}

#[async_trait]
impl AgentCallback for RecordingCallback {
    async fn on_iteration_start(&self, iteration: usize, _max_iterations: usize) {
        self.iterations.lock().await.push(iteration);
    }

    async fn on_thought(&self, thought: &str) {
        self.thoughts.lock().await.push(thought.to_string());
    }

    async fn on_tool_start(&self, tool: &str, _args: &serde_json::Value) {
        self.tool_calls.lock().await.push(tool.to_string());
    }

    async fn on_tool_result(&self, tool: &str, _observation: &str, is_error: bool, _duration_ms: u64) {
        self.tool_results
            .lock()
            .await
            .push((tool.to_string(), is_error));
    }

    async fn on_final_answer(&self, answer: &str) {
        self.final_answers.lock().await.push(answer.to_string());
    }
}

/// Candidates for the answer when the budget runs out.
#[derive(Default)]
struct PartialAnswer {
    observation: Option<String>,
    unstructured: Option<String>,
    thought: Option<String>,
}

impl PartialAnswer {
    fn best(self, max_iterations: usize) -> String {
        self.observation
            .or(self.unstructured)
            .or(self.thought)
            .unwrap_or_else(|| {
                format!("I could not reach a final answer within {max_iterations} steps.")
            })
    }
}

/// The ReAct agent.
pub struct ReactAgent {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    config: ReactConfig,
    callback: Arc<dyn AgentCallback>,
}

impl ReactAgent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        config: ReactConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
            callback: Arc::new(NoOpCallback),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn AgentCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn config(&self) -> &ReactConfig {
        &self.config
    }

    /// System prompt listing the registered tools and the expected format.
    pub fn system_prompt(&self) -> String {
        let tools = self
            .registry
            .list_definitions()
            .iter()
            .map(|d| format!("{}: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n");
        let names = self.registry.list_names().join(", ");
        format!(
            "You are AgriMind, an agricultural assistant that answers farmers' questions \
             by reasoning step by step and using tools.\n\n\
             You have access to the following tools:\n{tools}\n\n\
             Use the following format:\n\n\
             Question: the input question you must answer\n\
             Thought: you should always think about what to do\n\
             Action: the action to take, should be one of [{names}]\n\
             Action Input: the input to the action (plain text, or a JSON object)\n\
             Observation: the result of the action\n\
             ... (this Thought/Action/Action Input/Observation can repeat up to {max} times)\n\
             Thought: I now know the final answer\n\
             Final Answer: the final answer to the original input question\n\n\
             Never write the Observation yourself; it is provided after each Action.",
            max = self.config.effective_max_iterations()
        )
    }

    fn build_prompt(question: &str, transcript: &str, steps: &[ReactStep]) -> String {
        let mut prompt = String::new();
        if !transcript.is_empty() {
            prompt.push_str("Previous conversation:\n");
            prompt.push_str(transcript);
            prompt.push_str("\n\n");
        }
        prompt.push_str("Question: ");
        prompt.push_str(question);
        prompt.push('\n');
        for step in steps {
            if !step.thought.is_empty() {
                prompt.push_str(&format!("Thought: {}\n", step.thought));
            }
            if let Some(action) = &step.action {
                prompt.push_str(&format!(
                    "Action: {}\nAction Input: {}\n",
                    action.tool, action.input
                ));
            }
            if let Some(observation) = &step.observation {
                prompt.push_str(&format!("Observation: {observation}\n"));
            }
        }
        prompt.push_str("Thought:");
        prompt
    }

    /// Run the loop for one question.
    pub async fn run(
        &self,
        question: &str,
        history: &ConversationHistory,
    ) -> Result<ReactOutcome, AgriError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::EmptyTask.into());
        }

        let max_iterations = self.config.effective_max_iterations();
        let options = ThinkOptions::default()
            .with_temperature(self.config.temperature)
            .with_stop(OBSERVATION_STOP);
        let mut brain = Brain::new(Arc::clone(&self.provider), self.system_prompt());
        let transcript = history.render_transcript();

        let mut steps: Vec<ReactStep> = Vec::new();
        let mut partial = PartialAnswer::default();
        let mut previous_action: Option<ToolInvocation> = None;

        info!(question, max_iterations, "Starting ReAct loop");

        for iteration in 1..=max_iterations {
            self.callback
                .on_iteration_start(iteration, max_iterations)
                .await;
            debug!(iteration, "ReAct iteration");

            let prompt = Self::build_prompt(question, &transcript, &steps);
            let response = brain
                .think_with_retry(&[Message::user(prompt)], &options, self.config.max_retries)
                .await?;

            match parse_react_output(response.text()) {
                ParsedOutput::Final { thought, answer } => {
                    if !thought.is_empty() {
                        self.callback.on_thought(&thought).await;
                    }
                    self.callback.on_final_answer(&answer).await;
                    steps.push(ReactStep {
                        iteration,
                        thought,
                        action: None,
                        observation: None,
                        is_error: false,
                    });
                    info!(iterations = iteration, "ReAct loop reached a final answer");
                    return Ok(ReactOutcome {
                        answer,
                        steps,
                        iterations: iteration,
                        termination: Termination::FinalAnswer,
                        usage: *brain.total_usage(),
                    });
                }
                ParsedOutput::Action {
                    thought,
                    tool,
                    input,
                } => {
                    if !thought.is_empty() {
                        self.callback.on_thought(&thought).await;
                        partial.thought = Some(thought.clone());
                    }
                    let invocation = ToolInvocation { tool, input };
                    let (observation, is_error) = self
                        .observe(&invocation, previous_action.as_ref(), &mut partial)
                        .await;
                    previous_action = Some(invocation.clone());
                    steps.push(ReactStep {
                        iteration,
                        thought,
                        action: Some(invocation),
                        observation: Some(observation),
                        is_error,
                    });
                }
                ParsedOutput::Unstructured(text) => {
                    debug!(iteration, "Model reply did not follow the ReAct format");
                    if !text.is_empty() {
                        partial.unstructured = Some(text.clone());
                    }
                    previous_action = None;
                    steps.push(ReactStep {
                        iteration,
                        thought: text,
                        action: None,
                        observation: Some(FORMAT_REMINDER.to_string()),
                        is_error: true,
                    });
                }
            }
        }

        warn!(
            max_iterations,
            "ReAct loop exhausted its iteration budget; returning best partial answer"
        );
        Ok(ReactOutcome {
            answer: partial.best(max_iterations),
            steps,
            iterations: max_iterations,
            termination: Termination::IterationBudgetExhausted,
            usage: *brain.total_usage(),
        })
    }

    /// Produce the observation for one requested action.
    async fn observe(
        &self,
        invocation: &ToolInvocation,
        previous: Option<&ToolInvocation>,
        partial: &mut PartialAnswer,
    ) -> (String, bool) {
        let tool = invocation.tool.as_str();
        if !self.registry.contains(tool) {
            let available = self.registry.list_names().join(", ");
            warn!(tool, "Model requested an unknown tool");
            return (
                format!("Error: unknown tool '{tool}'. Available tools: {available}"),
                true,
            );
        }

        if previous == Some(invocation) {
            debug!(tool, "Skipping repeated action");
            return (
                format!(
                    "You already ran {tool} with this exact input; its result is in the previous \
                     Observation. Use it, try a different action, or give the Final Answer."
                ),
                true,
            );
        }

        let args = tool_args_from_text(&invocation.input);
        self.callback.on_tool_start(tool, &args).await;
        let started = Instant::now();
        let result = self.registry.execute(tool, args).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let observation =
                    truncate_chars(&output.content, self.config.max_observation_chars).to_string();
                self.callback
                    .on_tool_result(tool, &observation, false, duration_ms)
                    .await;
                if !observation.trim().is_empty() {
                    partial.observation = Some(observation.clone());
                }
                (observation, false)
            }
            Err(e) => {
                warn!(tool, error = %e, "Tool execution failed");
                let observation = format!("Error: {e}");
                self.callback
                    .on_tool_result(tool, &observation, true, duration_ms)
                    .await;
                (observation, true)
            }
        }
    }
}
