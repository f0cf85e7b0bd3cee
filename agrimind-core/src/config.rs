//! Configuration system for AgriMind.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/agrimind/config.toml` and/or `.agrimind/config.toml`
//! in the workspace directory.

use crate::types::Capability;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub llm: LlmConfig,
    pub router: RouterConfig,
    pub agent: AgentConfig,
    pub history: HistoryConfig,
    pub tools: ToolsConfig,
    pub pipeline: PipelineConfig,
}

impl AssistantConfig {
    /// Check the configuration for values that will misbehave at runtime.
    ///
    /// Returns human-readable warnings; an empty list means the config looks sane.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        if !(0.0..=1.0).contains(&self.router.min_confidence) {
            warnings.push(format!(
                "router.min_confidence ({}) is outside 0.0–1.0",
                self.router.min_confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.router.agent_threshold) {
            warnings.push(format!(
                "router.agent_threshold ({}) is outside 0.0–1.0",
                self.router.agent_threshold
            ));
        }
        for key in self.router.extra_keywords.keys() {
            if key.parse::<Capability>().is_err() {
                warnings.push(format!("router.extra_keywords has unknown capability '{key}'"));
            }
        }
        if self.agent.max_iterations == 0 {
            warnings.push("agent.max_iterations is 0; the loop will run a single step".into());
        }
        if self.history.max_turns == 0 {
            warnings.push("history.max_turns is 0; one turn will be kept".into());
        }
        if self.tools.chunk_overlap >= self.tools.chunk_size {
            warnings.push(format!(
                "tools.chunk_overlap ({}) must be smaller than tools.chunk_size ({})",
                self.tools.chunk_overlap, self.tools.chunk_size
            ));
        }
        warnings
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" (any OpenAI-compatible endpoint) or "mock".
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o-mini", "llama3.1:8b").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional explicit API key (takes precedence over the env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Context window size for the model.
    pub context_window: usize,
    /// Retries for transient provider errors.
    pub max_retries: usize,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 1024,
            temperature: 0.7,
            context_window: 128_000,
            max_retries: 2,
            request_timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.temperature < 0.0 || self.temperature > 2.0 {
            warnings.push(format!(
                "temperature ({}) is outside the typical range 0.0–2.0",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            warnings.push("llm.max_tokens is 0".to_string());
        }
        warnings
    }
}

/// Tool router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum score for the top capability; below it the fallback is used.
    pub min_confidence: f64,
    /// Capability chosen when nothing scores above `min_confidence`.
    pub fallback: Capability,
    /// Size of the normalized-query → scores LRU cache.
    pub cache_size: usize,
    /// A capability scoring at least this much counts as a secondary intent.
    pub agent_threshold: f64,
    /// Extra keywords per capability (keyed by capability name).
    #[serde(default)]
    pub extra_keywords: HashMap<String, Vec<String>>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            fallback: Capability::Retrieval,
            cache_size: 128,
            agent_threshold: 0.3,
            extra_keywords: HashMap::new(),
        }
    }
}

/// ReAct agent loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Whether multi-step queries go through the ReAct loop.
    pub enabled: bool,
    /// Hard cap on Thought/Action/Observation iterations.
    pub max_iterations: usize,
    /// Tool observations longer than this are truncated before re-prompting.
    pub max_observation_chars: usize,
    /// Sampling temperature for reasoning steps.
    pub temperature: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: 5,
            max_observation_chars: 1200,
            temperature: 0.2,
        }
    }
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Number of user/assistant turns kept in memory.
    pub max_turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_turns: 10 }
    }
}

/// Tools configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Timeout for tool execution in seconds.
    pub default_timeout_secs: u64,
    /// Directory of `.txt`/`.md` documents indexed by the knowledge base.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_dir: Option<PathBuf>,
    /// Number of passages returned by knowledge search.
    pub top_k: usize,
    /// Maximum characters per indexed chunk.
    pub chunk_size: usize,
    /// Characters carried over between adjacent chunks.
    pub chunk_overlap: usize,
    /// Coefficients for the numeric prediction models.
    #[serde(default)]
    pub prediction: PredictionConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            knowledge_dir: None,
            top_k: 3,
            chunk_size: 800,
            chunk_overlap: 100,
            prediction: PredictionConfig::default(),
        }
    }
}

/// A linear model: `intercept + Σ weight[feature] * value[feature]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelConfig {
    pub intercept: f64,
    pub weights: BTreeMap<String, f64>,
}

/// Coefficients for the crop yield regressor and the irrigation classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Yield regression in tonnes per hectare.
    pub yield_model: LinearModelConfig,
    /// Logistic irrigation classifier (weights apply before the sigmoid).
    pub irrigation_model: LinearModelConfig,
    /// Probability above which irrigation is recommended.
    pub irrigation_threshold: f64,
    /// Values substituted for features missing from the query.
    pub feature_defaults: BTreeMap<String, f64>,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        let weights = |pairs: &[(&str, f64)]| -> BTreeMap<String, f64> {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        Self {
            yield_model: LinearModelConfig {
                intercept: 0.8,
                weights: weights(&[
                    ("rainfall_mm", 0.0025),
                    ("temperature_c", 0.05),
                    ("humidity_pct", 0.004),
                    ("soil_moisture_pct", 0.01),
                    ("fertilizer_kg_ha", 0.012),
                ]),
            },
            irrigation_model: LinearModelConfig {
                intercept: 3.0,
                weights: weights(&[
                    ("rainfall_mm", -0.004),
                    ("temperature_c", 0.06),
                    ("humidity_pct", -0.02),
                    ("soil_moisture_pct", -0.12),
                ]),
            },
            irrigation_threshold: 0.5,
            feature_defaults: weights(&[
                ("rainfall_mm", 800.0),
                ("temperature_c", 25.0),
                ("humidity_pct", 60.0),
                ("soil_moisture_pct", 30.0),
                ("fertilizer_kg_ha", 120.0),
            ]),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Route plain retrieval queries through the retrieve-then-generate pipeline.
    pub rag_enabled: bool,
    /// Additional pipeline definition files (TOML) loaded at startup.
    #[serde(default)]
    pub definition_files: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rag_enabled: true,
            definition_files: Vec::new(),
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `AGRIMIND_`)
/// 3. Workspace-local config (`.agrimind/config.toml`)
/// 4. User config (`~/.config/agrimind/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AssistantConfig>,
) -> Result<AssistantConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AssistantConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "agrimind", "agrimind") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".agrimind").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // AGRIMIND_LLM__MODEL, AGRIMIND_AGENT__MAX_ITERATIONS, etc.
    figment = figment.merge(Env::prefixed("AGRIMIND_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load configuration from a single explicit TOML file layered over defaults.
pub fn load_config_file(path: &Path) -> Result<AssistantConfig, crate::error::ConfigError> {
    if !path.exists() {
        return Err(crate::error::ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Figment::from(Serialized::defaults(AssistantConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| crate::error::ConfigError::ParseError {
            message: e.to_string(),
        })
}
