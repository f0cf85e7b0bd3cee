//! # AgriMind Tools
//!
//! The capability tools the router dispatches to: knowledge search, text
//! generation, translation, crop prediction, and web search.

pub mod generate;
pub mod knowledge;
pub mod predict;
pub mod translate;
pub mod web;

use agrimind_core::brain::LlmProvider;
use agrimind_core::config::AssistantConfig;
use agrimind_core::registry::{Tool, ToolRegistry};
use knowledge::{KnowledgeBase, KnowledgeConfig};
use std::sync::Arc;
use std::time::Duration;

/// Build the knowledge base from `tools.knowledge_dir`, or an empty one.
///
/// A missing or unreadable directory is logged and leaves the base empty.
pub fn build_knowledge_base(config: &AssistantConfig) -> Option<KnowledgeBase> {
    let kb_config = KnowledgeConfig::from(&config.tools);
    let mut kb = match KnowledgeBase::new(kb_config) {
        Ok(kb) => kb,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create knowledge base");
            return None;
        }
    };
    if let Some(dir) = &config.tools.knowledge_dir {
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "Knowledge directory not found");
        } else if let Err(e) = kb.load_dir(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to load knowledge directory");
        }
    }
    Some(kb)
}

/// Register all five capability tools.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    provider: Arc<dyn LlmProvider>,
    config: &AssistantConfig,
) {
    let timeout = Duration::from_secs(config.tools.default_timeout_secs.max(1));
    let retries = config.llm.max_retries;

    let mut tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(
            generate::TextGenerateTool::new(Arc::clone(&provider))
                .with_temperature(config.llm.temperature)
                .with_max_tokens(config.llm.max_tokens)
                .with_max_retries(retries)
                .with_timeout(timeout),
        ),
        Arc::new(
            translate::TranslateTool::new(Arc::clone(&provider))
                .with_max_retries(retries)
                .with_timeout(timeout),
        ),
        Arc::new(predict::CropPredictTool::new(config.tools.prediction.clone())),
        Arc::new(web::WebSearchTool::new().with_timeout(timeout)),
    ];

    if let Some(kb) = build_knowledge_base(config) {
        tools.push(Arc::new(knowledge::KnowledgeSearchTool::new(
            Arc::new(kb),
            config.tools.top_k,
        )));
    }

    for tool in tools {
        if let Err(e) = registry.register(tool) {
            tracing::warn!("Failed to register tool: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrimind_core::brain::MockLlmProvider;
    use agrimind_core::types::Capability;

    #[test]
    fn test_every_capability_has_a_tool() {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(
            &mut registry,
            Arc::new(MockLlmProvider::new()),
            &AssistantConfig::default(),
        );
        assert_eq!(registry.len(), Capability::all().len());
        for capability in Capability::all() {
            assert!(registry.contains(capability.tool_name()), "{capability}");
        }
    }

    #[test]
    fn test_missing_knowledge_dir_still_registers() {
        let mut config = AssistantConfig::default();
        config.tools.knowledge_dir = Some("/nonexistent/agrimind/corpus".into());
        let kb = build_knowledge_base(&config).unwrap();
        assert!(kb.is_empty());
    }
}
