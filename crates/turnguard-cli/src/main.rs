//! turnguard: watches an AI coding agent's turns and blocks, warns or
//! suggests according to a rule file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;

use turnguard_core::{Action, HookResponse};
use turnguard_runtime::EngineConfig;

mod hook;
mod logging;
mod policy;

use hook::HookRunner;

#[derive(Parser, Debug)]
#[command(name = "turnguard", version, about = "Behavior-rule monitor for AI coding agent turns")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stop hook: read hook JSON on stdin, print a decision on stdout
    Hook {
        /// Rule file to use instead of the configured one
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Validate and list the active rules
    Rules {
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Manage the shared OpenCode server (session start/end hooks)
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ServerAction {
    Acquire,
    Release,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, issues) = EngineConfig::load_reporting(&|key| std::env::var(key).ok());
    logging::init(&config.log_path(), cli.verbose);
    for issue in &issues {
        tracing::warn!(error = %issue, "Ignoring configuration value");
    }

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: EngineConfig) -> Result<()> {
    match command {
        Commands::Hook { rules } => {
            cmd_hook(config, rules).await;
            Ok(())
        }
        Commands::Rules { rules } => cmd_rules(&config, rules),
        Commands::Server { action } => {
            cmd_server(&config, action).await;
            Ok(())
        }
        Commands::Config => {
            cmd_config(&config);
            Ok(())
        }
    }
}

async fn read_stdin() -> String {
    let mut raw = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut raw).await {
        tracing::warn!(error = %e, "Failed to read stdin");
    }
    raw
}

fn emit(response: &HookResponse) {
    if let Some(line) = response.to_json_line() {
        println!("{line}");
    }
}

async fn cmd_hook(config: EngineConfig, rules: Option<PathBuf>) {
    let raw = read_stdin().await;

    let runner = HookRunner::new(config)
        .with_rules(rules)
        .with_project_dir(
            std::env::var_os("CLAUDE_PROJECT_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        )
        .with_process_dir(std::env::current_dir().ok());

    if let Some(response) = runner.run(&raw).await {
        emit(&response);
    }
}

fn cmd_rules(config: &EngineConfig, rules: Option<PathBuf>) -> Result<()> {
    let source = config.rule_source(rules.as_deref());
    let rules = source
        .load()
        .with_context(|| format!("Invalid rule file: {source}"))?;

    println!("Rules from {source}: {} total", rules.len());
    println!(
        "  block: {}, notify: {}, suggest: {}",
        rules.count_by_action(Action::Block),
        rules.count_by_action(Action::Notify),
        rules.count_by_action(Action::Suggest),
    );
    for (id, rule) in rules.iter() {
        let timeout = rule
            .timeout
            .map(|t| format!(" timeout={}", humantime::format_duration(t)))
            .unwrap_or_default();
        println!(
            "{id} [{}/{}]{timeout} {}",
            rule.mode, rule.action, rule.criteria
        );
    }
    Ok(())
}

#[cfg(unix)]
async fn cmd_server(config: &EngineConfig, action: ServerAction) {
    use turnguard_runtime::ServerLifecycle;

    // hook context on stdin is only informational here
    let raw = read_stdin().await;
    let session = serde_json::from_str::<serde_json::Value>(&raw)
        .ok()
        .and_then(|v| v.get("session_id").and_then(|s| s.as_str()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let lifecycle = ServerLifecycle::from_config(config);
    match action {
        ServerAction::Acquire => {
            tracing::info!(session = %session, port = lifecycle.port(), "Acquiring server");
            if let Err(e) = lifecycle.acquire().await {
                tracing::warn!(error = %e, "Could not start OpenCode server");
                emit(&HookResponse::advisory(
                    "⚠️ turnguard: Could not start OpenCode server. \
                     Is the 'opencode' binary installed and on PATH?",
                ));
            }
        }
        ServerAction::Release => {
            tracing::info!(session = %session, "Releasing server");
            if let Err(e) = lifecycle.release().await {
                tracing::warn!(error = %e, "Failed to release server");
            }
        }
    }
}

#[cfg(not(unix))]
async fn cmd_server(_config: &EngineConfig, action: ServerAction) {
    tracing::warn!(?action, "Server lifecycle is only supported on unix");
}

fn cmd_config(config: &EngineConfig) {
    for (key, value) in config.describe() {
        println!("{key:<22} {value}");
    }
    println!("{:<22} {}", "rule_source", config.rule_source(None));
    println!("{:<22} {}", "log_file", config.log_path().display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hook_with_rules() {
        let cli = Cli::try_parse_from(["turnguard", "hook", "--rules", "r.csv", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Hook { rules: Some(ref p) } if p == &PathBuf::from("r.csv")
        ));
    }

    #[test]
    fn test_parse_server_actions() {
        let cli = Cli::try_parse_from(["turnguard", "server", "release"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Server {
                action: ServerAction::Release
            }
        ));
        assert!(Cli::try_parse_from(["turnguard", "server", "restart"]).is_err());
    }

    #[test]
    fn test_rules_command_rejects_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rules.csv");
        std::fs::write(&path, "Question?,turn,explode,Explain\n").unwrap();

        let config = EngineConfig {
            config_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        assert!(cmd_rules(&config, Some(path)).is_err());
    }

    #[test]
    fn test_rules_command_lists_bundled() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig {
            config_dir: dir.path().to_path_buf(),
            rules_path: None,
            ..EngineConfig::default()
        };
        assert!(cmd_rules(&config, None).is_ok());
    }
}
