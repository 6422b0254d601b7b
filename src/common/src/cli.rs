use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments. `RUST_LOG` wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("BlobTier Configuration:");
            println!("=======================");
            println!("Storage DSN: {}", config.storage.dsn);
            println!("Container: {}", config.lifecycle.container);
            println!("Lifecycle enabled: {}", config.lifecycle.enabled);
            println!(
                "Cycle interval: {}",
                humantime::format_duration(config.lifecycle.interval)
            );
            println!("Max concurrency: {}", config.lifecycle.max_concurrency);
            println!("Dry run: {}", config.lifecycle.dry_run);
            for (index, rule) in config.lifecycle.rules.iter().enumerate() {
                println!(
                    "Rule {}: {} -> {} after {} (priority {}){}",
                    index,
                    rule.source,
                    rule.target,
                    humantime::format_duration(rule.min_age),
                    rule.priority,
                    rule.name
                        .as_ref()
                        .map(|n| format!(" [{n}]"))
                        .unwrap_or_default()
                );
            }
            if config.gateway.enabled {
                println!("Gateway bind: {}", config.gateway.bind);
            } else {
                println!("Gateway: disabled");
            }
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate().context("Configuration is invalid")?;
        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require starting services
    ///
    /// Returns `true` when the command was handled and the process should exit.
    pub async fn handle_common_command(
        command: &CommonCommands,
        config: &Configuration,
    ) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "blobtier {} (rust {})",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
