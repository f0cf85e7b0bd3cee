//! Assistant: routes a query and executes it directly, through a pipeline,
//! or through the ReAct agent, then records the turn in history.

use crate::brain::LlmProvider;
use crate::config::AssistantConfig;
use crate::error::{AgriError, PipelineError, RouterError};
use crate::history::ConversationHistory;
use crate::pipeline::{Pipeline, PipelineResult, builtin_pipelines};
use crate::react::{AgentCallback, NoOpCallback, ReactAgent, ReactConfig, ReactStep};
use crate::registry::ToolRegistry;
use crate::router::{RouteDecision, RouterStats, ToolRouter};
use crate::types::Capability;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the pipeline used for plain retrieval queries.
pub const RAG_PIPELINE: &str = "rag_answer";

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// One tool call for the routed capability.
    Direct,
    /// The retrieve-then-generate pipeline.
    Pipeline,
    /// The ReAct loop.
    Agent,
}

impl std::fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseMode::Direct => write!(f, "direct"),
            ResponseMode::Pipeline => write!(f, "pipeline"),
            ResponseMode::Agent => write!(f, "agent"),
        }
    }
}

/// The assistant's answer plus how it was reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub answer: String,
    pub mode: ResponseMode,
    pub route: RouteDecision,
    /// Agent steps (empty unless the agent ran).
    pub steps: Vec<ReactStep>,
    /// Pipeline trace (present only in pipeline mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineResult>,
    /// Agent iterations used (0 unless the agent ran).
    pub iterations: usize,
    /// Whether a direct or pipeline failure was handed to the agent.
    pub escalated: bool,
}

/// Orchestrates routing, execution, and history for one conversation.
pub struct Assistant {
    config: AssistantConfig,
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    router: ToolRouter,
    history: ConversationHistory,
    pipelines: BTreeMap<String, Pipeline>,
    callback: Arc<dyn AgentCallback>,
}

impl Assistant {
    pub fn new(
        config: AssistantConfig,
        provider: Arc<dyn LlmProvider>,
        registry: ToolRegistry,
    ) -> Self {
        let router = ToolRouter::new(config.router.clone());
        let history = ConversationHistory::new(config.history.max_turns);
        let registry = Arc::new(registry);
        for capability in registry.missing_capabilities() {
            warn!(%capability, tool = capability.tool_name(), "No tool registered for capability");
        }

        let mut pipelines: BTreeMap<String, Pipeline> = builtin_pipelines()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        for path in &config.pipeline.definition_files {
            let loaded = Pipeline::from_file(path).and_then(|pipeline| {
                pipeline.validate(&registry)?;
                Ok(pipeline)
            });
            match loaded {
                Ok(pipeline) => {
                    info!(pipeline = %pipeline.name, path = %path.display(), "Loaded pipeline definition");
                    pipelines.insert(pipeline.name.clone(), pipeline);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping pipeline definition"),
            }
        }

        Self {
            config,
            provider,
            registry,
            router,
            history,
            pipelines,
            callback: Arc::new(NoOpCallback),
        }
    }

    /// Receive ReAct progress events (thoughts, tool calls) while the agent runs.
    pub fn with_callback(mut self, callback: Arc<dyn AgentCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Add or replace a pipeline after validating it against the registry.
    pub fn register_pipeline(&mut self, pipeline: Pipeline) -> Result<(), PipelineError> {
        pipeline.validate(&self.registry)?;
        self.pipelines.insert(pipeline.name.clone(), pipeline);
        Ok(())
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// Answer a query.
    ///
    /// Multi-intent queries go to the agent; retrieval queries go through the
    /// RAG pipeline; everything else calls the routed tool directly. A failed
    /// direct or pipeline attempt is retried through the agent when enabled.
    pub async fn handle(&mut self, query: &str) -> Result<AssistantResponse, AgriError> {
        let route = self.router.route(query)?;
        let query = query.trim();

        let response = if self.config.agent.enabled && self.router.needs_agent(query, &route) {
            info!(capability = %route.capability, "Query needs multi-step reasoning");
            self.run_agent(query, route, false).await?
        } else {
            match self.run_single(query, &route).await {
                Ok((answer, mode, pipeline)) => AssistantResponse {
                    answer,
                    mode,
                    route,
                    steps: Vec::new(),
                    pipeline,
                    iterations: 0,
                    escalated: false,
                },
                Err(e) if self.config.agent.enabled => {
                    warn!(
                        capability = %route.capability,
                        error = %e,
                        "Single-step execution failed; escalating to agent"
                    );
                    self.run_agent(query, route, true).await?
                }
                Err(e) => return Err(e),
            }
        };

        let capability = match response.mode {
            ResponseMode::Agent => None,
            ResponseMode::Direct | ResponseMode::Pipeline => Some(response.route.capability),
        };
        self.history.record(query, &response.answer, capability);

        info!(
            mode = %response.mode,
            escalated = response.escalated,
            "Query handled"
        );
        Ok(response)
    }

    /// Run one capability directly or through the RAG pipeline.
    async fn run_single(
        &self,
        query: &str,
        route: &RouteDecision,
    ) -> Result<(String, ResponseMode, Option<PipelineResult>), AgriError> {
        if route.capability == Capability::Retrieval
            && self.config.pipeline.rag_enabled
            && let Some(pipeline) = self.pipelines.get(RAG_PIPELINE)
        {
            let result = pipeline.run(&self.registry, query).await?;
            return Ok((result.output.clone(), ResponseMode::Pipeline, Some(result)));
        }

        let output = self
            .registry
            .execute_capability(route.capability, query)
            .await?;
        Ok((output.content, ResponseMode::Direct, None))
    }

    async fn run_agent(
        &self,
        query: &str,
        route: RouteDecision,
        escalated: bool,
    ) -> Result<AssistantResponse, AgriError> {
        let agent = ReactAgent::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.registry),
            ReactConfig::from_config(&self.config),
        )
        .with_callback(Arc::clone(&self.callback));
        let outcome = agent.run(query, &self.history).await?;
        Ok(AssistantResponse {
            answer: outcome.answer,
            mode: ResponseMode::Agent,
            route,
            steps: outcome.steps,
            pipeline: None,
            iterations: outcome.iterations,
            escalated,
        })
    }

    /// Route without executing anything.
    pub fn route_only(&mut self, query: &str) -> Result<RouteDecision, RouterError> {
        self.router.route(query)
    }

    /// Whether the agent would handle this query.
    pub fn would_use_agent(&self, query: &str, route: &RouteDecision) -> bool {
        self.config.agent.enabled && self.router.needs_agent(query, route)
    }

    /// Run a named pipeline. Does not touch history.
    pub async fn run_pipeline(
        &self,
        name: &str,
        input: &str,
        vars: &HashMap<String, String>,
    ) -> Result<PipelineResult, AgriError> {
        let pipeline = self
            .pipelines
            .get(name)
            .ok_or_else(|| PipelineError::NotFound {
                name: name.to_string(),
            })?;
        Ok(pipeline.run_with_vars(&self.registry, input, vars).await?)
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Forget the conversation and cached routes.
    pub fn reset(&mut self) {
        self.history.clear();
        self.router.clear_cache();
    }

    pub fn router_stats(&self) -> &RouterStats {
        self.router.stats()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }
}
