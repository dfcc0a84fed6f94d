//! rustible-vmss - Azure Orchestrated Virtual Machine Scale Sets, declaratively
//!
//! This is the main entry point for the rustible-vmss CLI.

mod cli;

use anyhow::Result;
use cli::commands::{exit_code, CommandContext};
use cli::{Cli, Commands};
use rustible_vmss::config::{Config, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let (config, config_error) = match Config::load(cli.config.as_ref()) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), &config.logging);

    // Display version if verbose
    if cli.verbosity() >= 2 {
        eprintln!("rustible-vmss v{} by {}", VERSION, AUTHORS);
    }

    // Create command context
    let mut ctx = CommandContext::new(&cli, config);

    if let Some(e) = config_error {
        ctx.output
            .warning(&format!("Failed to load config, using defaults: {:#}", e));
    }

    // Execute the appropriate command
    let result = match &cli.command {
        Commands::Apply(args) => args.execute(&mut ctx).await,
        Commands::Plan(args) => args.execute(&mut ctx).await,
        Commands::Show(args) => args.execute(&mut ctx).await,
        Commands::Import(args) => args.execute(&mut ctx).await,
        Commands::Destroy(args) => args.execute(&mut ctx).await,
        Commands::ValidateId(args) => args.execute(&mut ctx).await,
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            ctx.output.error(&format!("{:#}", e));
            exit_code(&e)
        }
    };

    std::process::exit(code);
}

/// Initialize logging based on verbosity level; without `-v` the configured
/// level applies
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.is_json() {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
