//! Pipelines: fixed sequences of tool calls chained through templates.
//!
//! A pipeline is a named list of steps. Each step renders its input template
//! (see [`template`]) against the pipeline input, the previous step's output,
//! earlier step outputs, and variables, then runs one tool. Steps run
//! sequentially; a failing step either aborts the run or is skipped.
//!
//! Pipelines can be built in code or loaded from TOML:
//!
//! ```toml
//! name = "rag_answer"
//! description = "Retrieve passages, then answer from them"
//!
//! [[steps]]
//! id = "retrieve"
//! tool = "knowledge_search"
//! input = "{{ input }}"
//!
//! [[steps]]
//! id = "answer"
//! tool = "text_generate"
//! input = "Context:\n{{ steps.retrieve }}\n\nQuestion: {{ input }}"
//! ```

pub mod template;

use crate::error::PipelineError;
use crate::registry::{ToolRegistry, tool_args_from_text};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use template::{Reference, TemplateContext};
use tracing::{debug, info, warn};

/// What to do when a step's tool fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    #[default]
    Fail,
    Skip,
}

fn default_step_input() -> String {
    "{{ previous }}".to_string()
}

/// One step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,
    pub tool: String,
    /// Input template; defaults to `{{ previous }}`.
    #[serde(default = "default_step_input")]
    pub input: String,
    #[serde(default)]
    pub on_error: ErrorAction,
}

/// A named sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Default values for `{{ vars.<name> }}`.
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub tool: String,
    pub rendered_input: String,
    pub status: StepStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub pipeline: String,
    pub steps: Vec<StepResult>,
    /// Output of the last completed step.
    pub output: String,
}

impl PipelineResult {
    pub fn skipped(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.status == StepStatus::Skipped)
    }
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            variables: HashMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Append a step that aborts the pipeline on failure.
    pub fn step(
        mut self,
        id: impl Into<String>,
        tool: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        self.steps.push(PipelineStep {
            id: id.into(),
            tool: tool.into(),
            input: input.into(),
            on_error: ErrorAction::Fail,
        });
        self
    }

    /// Change the error action of the most recently added step.
    pub fn on_error(mut self, action: ErrorAction) -> Self {
        if let Some(last) = self.steps.last_mut() {
            last.on_error = action;
        }
        self
    }

    /// Parse a pipeline definition from TOML.
    pub fn from_toml(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::ParseError {
            message: e.to_string(),
        })
    }

    /// Load a pipeline definition from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::ParseError {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&text)
    }

    /// Check the pipeline against a registry before running it.
    ///
    /// Rejects empty pipelines, duplicate step ids, unregistered tools, and
    /// templates that reference a step that does not run earlier.
    pub fn validate(&self, registry: &ToolRegistry) -> Result<(), PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::EmptyPipeline {
                name: self.name.clone(),
            });
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !registry.contains(&step.tool) {
                return Err(PipelineError::UnknownTool {
                    step: step.id.clone(),
                    tool: step.tool.clone(),
                });
            }
            for reference in template::references(&step.input)? {
                if let Reference::Step(id) = reference
                    && !seen.contains(id.as_str())
                {
                    return Err(PipelineError::TemplateError {
                        message: format!(
                            "Step '{}' references step '{id}' which does not run before it",
                            step.id
                        ),
                    });
                }
            }
            if !seen.insert(step.id.as_str()) {
                return Err(PipelineError::DuplicateStep {
                    id: step.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run the pipeline with its default variables.
    pub async fn run(
        &self,
        registry: &ToolRegistry,
        input: &str,
    ) -> Result<PipelineResult, PipelineError> {
        self.run_with_vars(registry, input, &HashMap::new()).await
    }

    /// Run the pipeline; `vars` override the pipeline's default variables.
    pub async fn run_with_vars(
        &self,
        registry: &ToolRegistry,
        input: &str,
        vars: &HashMap<String, String>,
    ) -> Result<PipelineResult, PipelineError> {
        self.validate(registry)?;

        let mut variables = self.variables.clone();
        variables.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut step_outputs: HashMap<String, String> = HashMap::new();
        let mut previous = input.to_string();
        let mut completed_any = false;
        let mut results = Vec::with_capacity(self.steps.len());

        info!(pipeline = %self.name, steps = self.steps.len(), "Running pipeline");

        for step in &self.steps {
            let rendered = {
                let ctx = TemplateContext {
                    input,
                    previous: &previous,
                    step_outputs: &step_outputs,
                    vars: &variables,
                };
                template::render(&step.input, &ctx)?
            };

            debug!(pipeline = %self.name, step = %step.id, tool = %step.tool, "Running pipeline step");
            let started = Instant::now();
            let result = registry
                .execute(&step.tool, tool_args_from_text(&rendered))
                .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    step_outputs.insert(step.id.clone(), output.content.clone());
                    previous = output.content.clone();
                    completed_any = true;
                    results.push(StepResult {
                        id: step.id.clone(),
                        tool: step.tool.clone(),
                        rendered_input: rendered,
                        status: StepStatus::Completed,
                        output: Some(output.content),
                        error: None,
                        duration_ms,
                    });
                }
                Err(e) if step.on_error == ErrorAction::Skip => {
                    warn!(pipeline = %self.name, step = %step.id, error = %e, "Skipping failed step");
                    results.push(StepResult {
                        id: step.id.clone(),
                        tool: step.tool.clone(),
                        rendered_input: rendered,
                        status: StepStatus::Skipped,
                        output: None,
                        error: Some(e.to_string()),
                        duration_ms,
                    });
                }
                Err(e) => {
                    warn!(pipeline = %self.name, step = %step.id, error = %e, "Pipeline step failed");
                    return Err(PipelineError::StepFailed {
                        step: step.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if !completed_any {
            return Err(PipelineError::StepFailed {
                step: self
                    .steps
                    .last()
                    .map(|s| s.id.clone())
                    .unwrap_or_default(),
                message: "no step produced output".to_string(),
            });
        }

        info!(pipeline = %self.name, "Pipeline completed");
        Ok(PipelineResult {
            pipeline: self.name.clone(),
            steps: results,
            output: previous,
        })
    }

    /// Retrieve passages from the knowledge base, then answer from them.
    pub fn rag_answer() -> Self {
        Pipeline::new("rag_answer")
            .with_description("Retrieve passages from the knowledge base, then answer from them")
            .step("retrieve", "knowledge_search", "{{ input }}")
            .step("answer", "text_generate", RAG_ANSWER_TEMPLATE)
    }

    /// Like `rag_answer`, then translate the answer into `vars.language`.
    pub fn translated_answer() -> Self {
        Pipeline::new("translated_answer")
            .with_description("Answer from the knowledge base, then translate the answer")
            .with_variable("language", "Hindi")
            .step("retrieve", "knowledge_search", "{{ input }}")
            .step("answer", "text_generate", RAG_ANSWER_TEMPLATE)
            .step(
                "translate",
                "translate",
                "Translate the following text into {{ vars.language }}:\n{{ previous }}",
            )
    }
}

const RAG_ANSWER_TEMPLATE: &str = "Answer the farmer's question using the context below. \
If the context is not relevant, say so and answer from general agronomy knowledge.\n\n\
Context:\n{{ steps.retrieve }}\n\nQuestion: {{ input }}";

/// The pipelines available without any configuration.
pub fn builtin_pipelines() -> Vec<Pipeline> {
    vec![Pipeline::rag_answer(), Pipeline::translated_answer()]
}
