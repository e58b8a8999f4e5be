// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sluice - a chat-room bridge for agent turns.
//!
//! The binary only inspects configuration. The engine itself is embedded by
//! the bridge process that owns the chat and subprocess transports.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sluice_config::{ConfigError, SluiceConfig};
use sluice_engine::EngineSettings;
use tracing::info;

/// Sluice - a chat-room bridge for agent turns.
#[derive(Parser, Debug)]
#[command(name = "sluice", version, about, long_about = None)]
struct Cli {
    /// Read this file instead of the standard config locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect Sluice configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate the configuration and report every problem found.
    Check,
    /// Print the effective configuration as TOML.
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            sluice_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.agent.log_level);

    match cli.command {
        Some(Commands::Config {
            action: ConfigAction::Check,
        }) => {
            let settings = EngineSettings::from(&config);
            info!(
                model = %settings.default_model,
                idle_timeout = ?settings.idle_timeout,
                approval_ttl = ?settings.approval_ttl,
                "configuration valid"
            );
            println!("sluice: configuration OK (agent.name={})", config.agent.name);
            ExitCode::SUCCESS
        }
        Some(Commands::Config {
            action: ConfigAction::Show,
        }) => match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                print!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("sluice: failed to render configuration: {e}");
                ExitCode::FAILURE
            }
        },
        None => {
            println!("sluice: use --help for available commands");
            ExitCode::SUCCESS
        }
    }
}

fn load(path: Option<&std::path::Path>) -> Result<SluiceConfig, Vec<ConfigError>> {
    match path {
        Some(path) => sluice_config::load_and_validate_path(path),
        None => sluice_config::load_and_validate(),
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sluice={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_config_subcommands() {
        let cli = Cli::try_parse_from(["sluice", "config", "check"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Check
            })
        ));
        let cli = Cli::try_parse_from(["sluice", "--config", "x.toml", "config", "show"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn default_config_renders_as_toml() {
        let config = sluice_config::load_and_validate_str("").expect("defaults should be valid");
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("[codex]"));
        assert!(rendered.contains("default_model = \"gpt-5-codex\""));
    }
}
