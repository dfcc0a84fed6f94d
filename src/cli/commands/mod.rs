//! Subcommands module for rustible-vmss CLI
//!
//! This module contains all the subcommand implementations.

pub mod apply;
pub mod resource;
pub mod validate;

use crate::cli::output::OutputFormatter;
use anyhow::{Context, Result};
use rustible_vmss::config::Config;
use rustible_vmss::error::Error;
use rustible_vmss::modules::cloud::azure::client::{
    RestScaleSetClientBuilder, VirtualMachineScaleSetsClient,
};
use rustible_vmss::modules::cloud::azure::vmss::{
    OrchestratedVmssResource, ResourceSettings, RESOURCE_TYPE,
};
use rustible_vmss::modules::{ModuleParams, ModuleRegistry};
use std::path::Path;
use std::sync::Arc;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
    /// Selected output format
    pub format: crate::cli::OutputFormat,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        let output = OutputFormatter::new(!cli.no_color, cli.output, cli.verbosity());

        Self {
            config,
            output,
            verbosity: cli.verbosity(),
            format: cli.output,
        }
    }

    /// True when output is JSON or YAML rather than human text
    pub fn output_is_structured(&self) -> bool {
        self.format != crate::cli::OutputFormat::Human
    }

    /// Resource settings derived from the loaded configuration
    pub fn settings(&self) -> ResourceSettings {
        ResourceSettings::from_config(&self.config)
    }

    /// Build the management API client from the `[azure]` config section
    pub fn client(&self) -> Result<Arc<dyn VirtualMachineScaleSetsClient>> {
        let client = RestScaleSetClientBuilder::from_azure_config(&self.config.azure)
            .build()
            .map_err(Error::from)?;
        self.output.debug(&format!(
            "Using management endpoint {}",
            self.config.azure.endpoint
        ));
        Ok(Arc::new(client))
    }

    /// A module registry holding the scale set module
    pub fn registry(&self) -> Result<ModuleRegistry> {
        Ok(ModuleRegistry::with_azure(self.client()?, self.settings()))
    }

    /// The scale set resource, for commands that bypass the module
    pub fn resource(&self) -> Result<OrchestratedVmssResource> {
        Ok(OrchestratedVmssResource::new(self.client()?, self.settings()))
    }
}

/// Load module parameters from a YAML or JSON file.
///
/// The file holds either the parameters themselves or a single
/// `azure_orchestrated_vmss:` key wrapping them, as in a task.
pub fn load_params(path: &Path) -> Result<ModuleParams> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()).into());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameter file: {}", path.display()))?;

    let value: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(Error::from)?,
        _ => serde_yaml::from_str(&content).map_err(Error::from)?,
    };

    let mut map = match value {
        serde_json::Value::Object(map) => map,
        _ => {
            return Err(Error::InvalidConfig {
                key: path.display().to_string(),
                message: "parameter file must contain a mapping".to_string(),
            }
            .into())
        }
    };

    if map.len() == 1 {
        if let Some(serde_json::Value::Object(inner)) = map.remove(RESOURCE_TYPE) {
            map = inner;
        }
    }

    Ok(map.into_iter().collect())
}

/// Map an error to the process exit status
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>().map_or(1, Error::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_params_unwraps_task_key() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "azure_orchestrated_vmss:\n  name: vmss1\n  resource_group_name: rg\n  state: absent"
        )
        .unwrap();

        let params = load_params(file.path()).unwrap();
        assert_eq!(params["name"], serde_json::json!("vmss1"));
        assert_eq!(params["state"], serde_json::json!("absent"));
        assert!(!params.contains_key(RESOURCE_TYPE));
    }

    #[test]
    fn test_load_params_rejects_lists() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "[1, 2]").unwrap();

        let err = load_params(file.path()).unwrap_err();
        assert_eq!(exit_code(&err), 5);
    }

    #[test]
    fn test_missing_file() {
        let err = load_params(Path::new("/nonexistent/vmss.yml")).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
