//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use agrimind_core::react::AgentCallback;
use agrimind_core::router::RouteDecision;
use agrimind_core::{Assistant, AssistantConfig, AssistantResponse, MockLlmProvider, ToolRegistry};
use agrimind_tools::register_builtin_tools;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Output settings shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub quiet: bool,
    pub verbose: u8,
}

/// Prints agent progress to stderr so stdout stays the answer.
pub(crate) struct CliCallback;

#[async_trait::async_trait]
impl AgentCallback for CliCallback {
    async fn on_iteration_start(&self, iteration: usize, max_iterations: usize) {
        eprintln!("\x1b[90m  step {iteration}/{max_iterations}\x1b[0m");
    }

    async fn on_thought(&self, thought: &str) {
        if !thought.is_empty() {
            eprintln!("\x1b[90m  thought: {thought}\x1b[0m");
        }
    }

    async fn on_tool_start(&self, tool: &str, args: &serde_json::Value) {
        eprintln!("\x1b[36m  [{tool}] {args}\x1b[0m");
    }

    async fn on_tool_result(&self, tool: &str, observation: &str, is_error: bool, duration_ms: u64) {
        let preview: String = observation.chars().take(160).collect();
        let ellipsis = if observation.chars().count() > 160 { "..." } else { "" };
        let colour = if is_error { "31" } else { "36" };
        eprintln!("\x1b[{colour}m  [{tool}] {duration_ms}ms: {preview}{ellipsis}\x1b[0m");
    }
}

/// Create the provider, register the tools, and wire up the assistant.
///
/// Falls back to the mock provider when the configured one cannot be built,
/// so routing and prediction still work offline.
pub fn build_assistant(config: AssistantConfig, options: Options) -> Assistant {
    let provider = match agrimind_core::create_provider(&config.llm) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("LLM provider init failed: {}. Using mock.", e);
            Arc::new(MockLlmProvider::new())
        }
    };

    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, Arc::clone(&provider), &config);

    let assistant = Assistant::new(config, provider, registry);
    if options.quiet {
        assistant
    } else {
        assistant.with_callback(Arc::new(CliCallback))
    }
}

/// Handle a one-shot CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: AssistantConfig,
    workspace: &Path,
    options: Options,
) -> anyhow::Result<()> {
    match command {
        Commands::Ask { query, json } => {
            let quiet = Options {
                quiet: options.quiet || json,
                ..options
            };
            let mut assistant = build_assistant(config, quiet);
            let response = assistant.handle(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response, options);
            }
            Ok(())
        }
        Commands::Route { query } => {
            let mut assistant = build_assistant(config, options);
            let route = assistant.route_only(&query)?;
            let agent = assistant.would_use_agent(&query, &route);
            print!("{}", format_route(&route, agent));
            Ok(())
        }
        Commands::Pipeline { name, input, vars } => {
            let assistant = build_assistant(config, options);
            let vars: HashMap<String, String> = vars.into_iter().collect();
            let result = assistant.run_pipeline(&name, &input, &vars).await?;
            if options.verbose > 0 {
                for step in &result.steps {
                    eprintln!(
                        "\x1b[90m  {} [{}] {:?} in {}ms\x1b[0m",
                        step.id, step.tool, step.status, step.duration_ms
                    );
                }
            }
            println!("{}", result.output);
            Ok(())
        }
        Commands::Chat => crate::repl::run_interactive(config, options).await,
        Commands::Config { action } => handle_config(action, &config, workspace),
    }
}

fn handle_config(action: ConfigAction, config: &AssistantConfig, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        ConfigAction::Init => {
            let config_dir = workspace.join(".agrimind");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&AssistantConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!("Created default configuration at: {}", config_path.display());
            Ok(())
        }
    }
}

/// Print the answer to stdout and a one-line provenance note to stderr.
pub fn print_response(response: &AssistantResponse, options: Options) {
    println!("{}", response.answer);
    if options.quiet {
        return;
    }
    let mut note = format!(
        "[{} via {}, confidence {:.2}",
        response.route.capability, response.mode, response.route.confidence
    );
    if response.iterations > 0 {
        note.push_str(&format!(", {} steps", response.iterations));
    }
    if response.escalated {
        note.push_str(", escalated");
    }
    note.push(']');
    eprintln!("\x1b[90m{note}\x1b[0m");
    let _ = std::io::stderr().flush();
}

/// Render a routing decision as a small table.
pub fn format_route(route: &RouteDecision, agent: bool) -> String {
    let mut out = format!(
        "Capability: {} ({})\nConfidence: {:.2}{}\nAgent:      {}\n\nScores:\n",
        route.capability,
        route.tool_name(),
        route.confidence,
        if route.fallback { " (fallback)" } else { "" },
        if agent { "yes" } else { "no" }
    );
    for score in &route.scores {
        out.push_str(&format!(
            "  {:<12} {:.2}\n",
            score.capability.to_string(),
            score.score
        ));
    }
    if !route.matched.is_empty() {
        out.push_str(&format!("\nMatched: {}\n", route.matched.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrimind_core::ToolRouter;

    #[test]
    fn test_format_route_lists_all_scores() {
        let mut router = ToolRouter::default();
        let route = router.route("Translate 'good morning' into Hindi").unwrap();
        let text = format_route(&route, false);
        assert!(text.starts_with("Capability: translation (translate)"));
        assert!(text.contains("Agent:      no"));
        assert_eq!(text.matches("\n  ").count(), 5);
        assert!(text.contains("Matched: "));
    }

    #[test]
    fn test_format_route_marks_fallback() {
        let mut router = ToolRouter::default();
        let route = router.route("hello there").unwrap();
        assert!(route.fallback);
        assert!(format_route(&route, false).contains("(fallback)"));
    }

    #[tokio::test]
    async fn test_build_assistant_with_mock_provider() {
        let mut config = AssistantConfig::default();
        config.llm.provider = "mock".into();
        let options = Options {
            quiet: true,
            verbose: 0,
        };
        let mut assistant = build_assistant(config, options);
        assert_eq!(assistant.registry().len(), 5);

        let response = assistant
            .handle("Predict wheat yield with rainfall 500 mm")
            .await
            .unwrap();
        assert!(response.answer.starts_with("Predicted yield"));
    }
}
