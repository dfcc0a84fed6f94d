//! CLI module for rustible-vmss
//!
//! This module provides the command-line interface, including argument
//! parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// rustible-vmss - Azure Orchestrated Virtual Machine Scale Sets, declaratively
#[derive(Parser, Debug, Clone)]
#[command(name = "rustible-vmss")]
#[command(author = "Rustible Contributors")]
#[command(version)]
#[command(about = "Manage Azure Orchestrated (Flexible) Virtual Machine Scale Sets", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "RUSTIBLE_VMSS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
    /// YAML output
    Yaml,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create or update a scale set to match a parameter file
    Apply(commands::apply::ApplyArgs),

    /// Show what apply would change without changing anything
    Plan(commands::apply::PlanArgs),

    /// Print the current attributes of a scale set
    Show(commands::resource::ShowArgs),

    /// Import an existing scale set as a parameter file
    Import(commands::resource::ImportArgs),

    /// Delete the scale set described by a parameter file
    Destroy(commands::apply::DestroyArgs),

    /// Validate Shared Image Gallery image version IDs
    #[command(name = "validate-id")]
    ValidateId(commands::validate::ValidateIdArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["rustible-vmss", "apply", "vmss.yml"]).unwrap();
        assert!(matches!(cli.command, Commands::Apply(_)));
        assert_eq!(cli.output, OutputFormat::Human);
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::try_parse_from(["rustible-vmss", "-vvvvv", "plan", "vmss.yml"]).unwrap();
        assert_eq!(cli.verbosity(), 3);
    }

    #[test]
    fn test_validate_id_accepts_many() {
        let cli = Cli::try_parse_from([
            "rustible-vmss",
            "--output",
            "json",
            "validate-id",
            "/a",
            "/b",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::ValidateId(args) => assert_eq!(args.ids.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
