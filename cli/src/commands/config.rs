// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use dcop_core::domain::{OptTableStoreConfig, SolverConfig};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./dcop-config.yaml)
        #[arg(short, long, default_value = "./dcop-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = SolverConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. DCOP_CONFIG_PATH: {}",
            std::env::var("DCOP_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./dcop-config.yaml");
        println!("  4. ~/.dcop/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Solve:".bold());
    println!("  Direction: {:?}", config.direction);
    println!("  Timeout: {:?}", config.timeout);
    match config.election_rounds {
        Some(rounds) => println!("  Election rounds: {}", rounds),
        None => println!("  Election rounds: {}", "(number of variables)".dimmed()),
    }
    println!();

    println!("{}", "Table storage:".bold());
    match &config.opt_table_store {
        OptTableStoreConfig::InMemory => println!("  In memory"),
        OptTableStoreConfig::OnDisk { directory } => println!("  On disk: {}", directory.display()),
    }
    println!();

    println!("{}", "Diagnostics:".bold());
    println!("  Message statistics: {}", config.collect_stats);
    println!("  Message tracing: {}", config.trace_messages);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = SolverConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = sample_config(with_examples);

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

fn sample_config(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/dcop-config-with-examples.yaml")
    } else {
        include_str!("../../templates/dcop-config.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcop_core::domain::Direction;

    #[test]
    fn test_templates_parse_and_validate() {
        let minimal = SolverConfig::from_yaml_str(sample_config(false)).unwrap();
        minimal.validate().unwrap();
        assert_eq!(minimal, SolverConfig::default());

        let full = SolverConfig::from_yaml_str(sample_config(true)).unwrap();
        full.validate().unwrap();
        assert_eq!(full.direction, Direction::Minimize);
        assert!(matches!(full.opt_table_store, OptTableStoreConfig::OnDisk { .. }));
    }

    #[tokio::test]
    async fn test_generate_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("dcop-config.yaml");
        generate(output.clone(), false).await.unwrap();
        let written = SolverConfig::from_yaml_file(&output).unwrap();
        assert_eq!(written, SolverConfig::default());
    }
}
