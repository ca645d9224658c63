mod actions;
mod agent;
mod command;
mod config;
mod desktop;
mod error;
mod executor;
mod gate;
mod llm;
mod sandbox;
mod validator;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::actions::{ActionContext, ActionRegistry, AppAliases, ExecutionResult, Status};
use crate::agent::{Pipeline, TurnOutcome, TurnReport};
use crate::config::Config;
use crate::desktop::SystemDesktop;
use crate::executor::Executor;
use crate::gate::{ConfirmationGate, TerminalConfirmer};
use crate::llm::LlmTranslator;
use crate::sandbox::PathAuthority;
use crate::validator::Validator;

const DEFAULT_CONFIG_PATH: &str = "config/warden.toml";

/// Longest listing printed in full; the rest is summarized.
const MAX_DISPLAYED_ITEMS: usize = 30;

fn print_help() {
    println!(
        "\
desk-warden v{}

A natural-language desktop assistant. Every action the language model
proposes is checked against a closed action list and the configured
directories before it runs; destructive actions always ask first.

USAGE:
    desk-warden [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: {DEFAULT_CONFIG_PATH}]

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit
        --actions    Print the action catalogue and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG              Log level filter for tracing
                          (e.g. debug, desk_warden=debug,warn)
    ANTHROPIC_API_KEY     API key for Anthropic Claude models
                          (from https://console.anthropic.com/)

EXAMPLES:
    desk-warden                          # uses {DEFAULT_CONFIG_PATH}
    desk-warden ~/.config/warden.toml    # custom config path
    RUST_LOG=debug desk-warden           # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

fn print_repl_help() {
    println!(
        "\
Type a request in plain language, for example:
  open my Projects folder
  list the files in D:\\Workspace\\reports
  find every pdf in my Documents
  delete D:\\Workspace\\old\\draft.txt

Commands:
  help            This message
  quit, exit, q   Leave"
    );
}

fn print_actions() -> Result<()> {
    let registry = ActionRegistry::builtin()?;
    println!("{}", registry.catalogue_text());
    Ok(())
}

/// Reads one line from the terminal. `None` on end of input.
fn read_line() -> io::Result<Option<String>> {
    print!("\n> ");
    io::stdout().flush()?;
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line)? {
        0 => Ok(None),
        _ => Ok(Some(line)),
    }
}

fn render(report: &TurnReport) {
    debug!("Turn {} trail: {:?}", report.turn_id, report.trail);
    match &report.outcome {
        TurnOutcome::Clarify { message } => println!("? {message}"),
        TurnOutcome::Refused { reason } => println!("✗ Refused: {reason}"),
        TurnOutcome::Completed(_) | TurnOutcome::Failed { .. } => {
            if let Some(stage) = report.failed_stage() {
                debug!("Stopped at {stage}");
            }
            if let Some(result) = report.result() {
                render_result(result);
            }
        }
    }
}

fn render_result(result: &ExecutionResult) {
    let marker = match result.status {
        Status::Success => "✓",
        Status::Failure => "✗",
        Status::Cancelled => "⊘",
    };
    println!("{marker} {}", result.message);

    let Some(data) = &result.data else {
        return;
    };

    if let Some(entries) = data.get("entries").and_then(Value::as_array) {
        for entry in entries.iter().take(MAX_DISPLAYED_ITEMS) {
            let name = entry.get("name").and_then(Value::as_str).unwrap_or("?");
            match (
                entry.get("kind").and_then(Value::as_str),
                entry.get("size").and_then(Value::as_u64),
            ) {
                (Some("dir"), _) => println!("  [dir]  {name}"),
                (_, Some(size)) => println!("  [file] {name} ({size} bytes)"),
                (kind, None) => println!("  [{}] {name}", kind.unwrap_or("?")),
            }
        }
        summarize_rest(entries.len());
    }

    if let Some(matches) = data.get("matches").and_then(Value::as_array) {
        for path in matches.iter().take(MAX_DISPLAYED_ITEMS) {
            println!("  {}", path.as_str().unwrap_or("?"));
        }
        summarize_rest(matches.len());
    }
}

fn summarize_rest(total: usize) {
    if total > MAX_DISPLAYED_ITEMS {
        println!("  ... and {} more", total - MAX_DISPLAYED_ITEMS);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("desk-warden v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--actions" => {
                print_actions()?;
                std::process::exit(0);
            }
            option if option.starts_with('-') => {
                anyhow::bail!("Unknown option {option} (see --help)");
            }
            path => config_path = path.to_string(),
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("desk_warden=info")),
        )
        .init();

    println!(
        r#"
     _           _                              _
  __| | ___  ___| | __   __      ____ _ _ __ __| | ___ _ __
 / _` |/ _ \/ __| |/ /___\ \ /\ / / _` | '__/ _` |/ _ \ '_ \
| (_| |  __/\__ \   <_____\ V  V / (_| | | | (_| |  __/ | | |
 \__,_|\___||___/_|\_\     \_/\_/ \__,_|_|  \__,_|\___|_| |_|
                                                        v{}
"#,
        env!("CARGO_PKG_VERSION")
    );

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)
        .with_context(|| format!("Cannot load configuration from {config_path}"))?;

    // Everything below is fixed for the lifetime of the process
    let authority = Arc::new(PathAuthority::new(
        &config.sandbox.allowed_roots,
        &config.sandbox.denied_paths,
    )?);
    let registry = Arc::new(ActionRegistry::builtin()?);
    let aliases = Arc::new(AppAliases::with_overrides(&config.applications.aliases));

    for root in authority.allowed_roots() {
        info!("Allowed root: {}", root.display());
    }
    info!(
        "Actions: {} registered, application aliases: {}",
        registry.len(),
        aliases.len()
    );

    let context = ActionContext {
        desktop: Arc::new(SystemDesktop),
        authority: authority.clone(),
        aliases,
        search_limit: config.sandbox.search_limit,
    };

    let client = llm::create_client(&config.llm)?;
    let translator = LlmTranslator::new(client, &registry, authority.allowed_roots());

    let mut pipeline = Pipeline::new(
        Box::new(translator),
        Validator::new(registry.clone(), authority),
        ConfirmationGate::new(Box::new(TerminalConfirmer)),
        Executor::new(registry, context),
        config.llm.timeout(),
    );

    info!("LLM: {}", pipeline.translator_description());
    println!("Type 'help' for examples, 'quit' to leave.");

    loop {
        let line = tokio::select! {
            line = tokio::task::spawn_blocking(read_line) => line??,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, exiting");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            "help" => print_repl_help(),
            "quit" | "exit" | "q" => break,
            utterance => {
                let report = pipeline.run_turn(utterance).await;
                render(&report);
            }
        }
    }

    println!("Bye.");
    Ok(())
}
