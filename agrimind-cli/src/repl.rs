//! Interactive chat REPL.

use crate::commands::{Options, build_assistant, format_route, print_response};
use agrimind_core::{Assistant, AssistantConfig};
use std::io::{self, BufRead, Write};

const HELP: &str = "Commands:
  /route <query>   show how a query would be routed
  /history         show the conversation so far
  /pipelines       list available pipelines
  /stats           routing statistics
  /clear           forget the conversation and the routing cache
  /help            this help
  /quit            exit";

/// What the REPL should do after a slash command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub async fn run_interactive(config: AssistantConfig, options: Options) -> anyhow::Result<()> {
    if !options.quiet {
        println!("\x1b[1;32m  AgriMind\x1b[0m  model: {}", config.llm.model);
        println!("  Ask about crops, pests, weather, prices, or yields. /help for commands, /quit to exit\n");
    }
    let mut assistant = build_assistant(config, options);

    let stdin = io::stdin();
    loop {
        print!("\x1b[1;34m> \x1b[0m");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            let mut out = String::new();
            let flow = handle_slash(input, &mut assistant, &mut out);
            print!("{out}");
            if flow == Flow::Quit {
                break;
            }
            continue;
        }

        match assistant.handle(input).await {
            Ok(response) => print_response(&response, options),
            Err(e) => eprintln!("\x1b[31mError:\x1b[0m {e}"),
        }
        println!();
    }
    Ok(())
}

fn handle_slash(input: &str, assistant: &mut Assistant, out: &mut String) -> Flow {
    let (cmd, arg) = match input.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (input, ""),
    };
    match cmd {
        "/quit" | "/exit" | "/q" => {
            out.push_str("Goodbye!\n");
            return Flow::Quit;
        }
        "/help" | "/?" => {
            out.push_str(HELP);
            out.push('\n');
        }
        "/route" => {
            if arg.is_empty() {
                out.push_str("Usage: /route <query>\n");
            } else {
                match assistant.route_only(arg) {
                    Ok(route) => {
                        let agent = assistant.would_use_agent(arg, &route);
                        out.push_str(&format_route(&route, agent));
                    }
                    Err(e) => out.push_str(&format!("Error: {e}\n")),
                }
            }
        }
        "/history" => {
            let transcript = assistant.history().render_transcript();
            if transcript.is_empty() {
                out.push_str("(no conversation yet)\n");
            } else {
                out.push_str(&transcript);
                out.push('\n');
            }
        }
        "/pipelines" => {
            for pipeline in assistant.pipelines() {
                let steps: Vec<&str> = pipeline.steps.iter().map(|s| s.tool.as_str()).collect();
                out.push_str(&format!(
                    "  {:<20} {}\n",
                    pipeline.name,
                    steps.join(" -> ")
                ));
            }
        }
        "/stats" => {
            let stats = assistant.router_stats();
            out.push_str(&format!(
                "Routed: {} | cache hits: {} | fallbacks: {}\n",
                stats.total_routed, stats.cache_hits, stats.fallbacks
            ));
            for (capability, count) in &stats.capability_hits {
                out.push_str(&format!("  {capability}: {count}\n"));
            }
        }
        "/clear" => {
            assistant.reset();
            out.push_str("Conversation cleared.\n");
        }
        other => {
            out.push_str(&format!("Unknown command: {other}. Type /help for commands.\n"));
        }
    }
    Flow::Continue
}
