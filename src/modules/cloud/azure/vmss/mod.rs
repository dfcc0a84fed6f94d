//! Orchestrated (Flexible) Virtual Machine Scale Sets.
//!
//! The resource is split by concern:
//!
//! - [`schema`]: the attribute schema
//! - [`os_profile`], [`network`], [`storage`], [`extensions`], [`profile`]:
//!   conversions between configured blocks and Compute API models
//! - [`resource`]: create, read, update, delete and import
//! - [`module`]: the [`Module`](crate::modules::Module) wrapper used by the CLI

pub mod extensions;
pub mod module;
pub mod network;
pub mod os_profile;
pub mod profile;
pub mod resource;
pub mod schema;
pub mod storage;

use std::time::Duration;

use thiserror::Error;

use super::client::AzureError;
use super::parse::ParseError;
use crate::config::{Config, TimeoutsConfig};
use crate::modules::ModuleError;

pub use module::AzureOrchestratedVmssModule;
pub use resource::OrchestratedVmssResource;
pub use schema::{resource_schema, RESOURCE_TYPE};

/// Errors raised while managing a scale set
#[derive(Error, Debug)]
pub enum VmssError {
    #[error("{0}")]
    InvalidConfig(String),

    #[error("validation failed:\n  {}", errors.join("\n  "))]
    Validation { errors: Vec<String> },

    #[error("expanding `{attribute}`: {message}")]
    Expand { attribute: String, message: String },

    #[error("{context}: {source}")]
    Api {
        context: String,
        #[source]
        source: AzureError,
    },

    #[error("{context}: `{field}` was nil")]
    MissingField { context: String, field: String },

    #[error(
        "A resource with the ID {id:?} already exists - to be managed via rustible-vmss this \
         resource needs to be imported: `rustible-vmss import {id}`"
    )]
    AlreadyExists { id: String },

    #[error(transparent)]
    InvalidId(#[from] ParseError),

    #[error(
        "importing Orchestrated Virtual Machine Scale Set {id:?}: scale set is not using \
         Orchestration Mode Flexible"
    )]
    NotFlexible { id: String },

    #[error("timed out after {after:?} while waiting to {operation} the scale set")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl VmssError {
    pub(crate) fn api(context: impl Into<String>, source: AzureError) -> Self {
        VmssError::Api {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn expand(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        VmssError::Expand {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Narrow a configured integer to the API's 32-bit field
    pub(crate) fn int32(attribute: &str, value: i64) -> VmssResult<i32> {
        i32::try_from(value).map_err(|_| {
            VmssError::expand(attribute, format!("{} does not fit in a 32-bit integer", value))
        })
    }

    pub(crate) fn missing(context: impl Into<String>, field: impl Into<String>) -> Self {
        VmssError::MissingField {
            context: context.into(),
            field: field.into(),
        }
    }
}

/// Result type for scale set operations
pub type VmssResult<T> = Result<T, VmssError>;

impl From<VmssError> for ModuleError {
    fn from(err: VmssError) -> Self {
        match err {
            VmssError::Validation { .. } | VmssError::InvalidConfig(_) => {
                ModuleError::InvalidParameter(err.to_string())
            }
            VmssError::InvalidId(_) => ModuleError::ParseError(err.to_string()),
            other => ModuleError::ExecutionFailed(other.to_string()),
        }
    }
}

/// Behaviour shared by every operation on the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSettings {
    pub timeouts: TimeoutsConfig,
    /// Scale capacity to zero before deleting, so instances shut down cleanly
    pub scale_to_zero_before_deletion: bool,
}

impl ResourceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeouts: config.timeouts,
            scale_to_zero_before_deletion: config.features.scale_to_zero_before_deletion,
        }
    }
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            timeouts: TimeoutsConfig::default(),
            scale_to_zero_before_deletion: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = VmssError::missing("retrieving Orchestrated Virtual Machine Scale Set", "properties");
        assert_eq!(
            err.to_string(),
            "retrieving Orchestrated Virtual Machine Scale Set: `properties` was nil"
        );

        let err = VmssError::AlreadyExists {
            id: "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachineScaleSets/v"
                .to_string(),
        };
        assert!(err.to_string().contains("needs to be imported"));
    }

    #[test]
    fn test_module_error_mapping() {
        let err: ModuleError = VmssError::Validation {
            errors: vec!["name: required field is not set".to_string()],
        }
        .into();
        assert!(matches!(err, ModuleError::InvalidParameter(_)));

        let err: ModuleError = VmssError::expand("os_profile", "boom").into();
        assert!(matches!(err, ModuleError::ExecutionFailed(_)));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.features.scale_to_zero_before_deletion = false;
        let settings = ResourceSettings::from_config(&config);
        assert!(!settings.scale_to_zero_before_deletion);
        assert_eq!(settings.timeouts, config.timeouts);
    }
}
