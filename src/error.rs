//! Error types for rustible-vmss.
//!
//! This module defines the top-level error type returned by the CLI and the
//! library entry points, wrapping the layered errors of the Azure resource.

use std::path::PathBuf;
use thiserror::Error;

use crate::modules::cloud::azure::client::AzureError;
use crate::modules::cloud::azure::parse::ParseError;
use crate::modules::cloud::azure::vmss::VmssError;
use crate::modules::ModuleError;

/// Result type alias for rustible-vmss operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for rustible-vmss.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A scale set operation failed.
    #[error(transparent)]
    Resource(#[from] VmssError),

    /// The management API returned an error.
    #[error(transparent)]
    Api(#[from] AzureError),

    /// A resource ID could not be parsed.
    #[error("Invalid resource ID: {0}")]
    InvalidId(#[from] ParseError),

    /// Resource configuration failed validation.
    #[error("Invalid configuration for '{resource}':\n{}", .errors.join("\n"))]
    Validation {
        /// Resource type name
        resource: String,
        /// Validation errors, one per attribute
        errors: Vec<String>,
    },

    // ========================================================================
    // Module Errors
    // ========================================================================
    /// Module not found.
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    /// Module execution failed.
    #[error("Module '{module}' execution failed: {message}")]
    ModuleExecution {
        /// Module name
        module: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// No credential available for the management API.
    #[error("No access token configured; set AZURE_ACCESS_TOKEN or azure.access_token")]
    MissingCredentials,

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new validation error.
    pub fn validation(resource: impl Into<String>, errors: Vec<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            errors,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Resource(_) | Error::ModuleExecution { .. } => 2,
            Error::Api(_) | Error::MissingCredentials => 3,
            Error::Validation { .. } | Error::InvalidId(_) => 4,
            Error::InvalidConfig { .. } => 5,
            _ => 1,
        }
    }
}

impl From<ModuleError> for Error {
    fn from(err: ModuleError) -> Self {
        match err {
            ModuleError::NotFound(name) => Error::ModuleNotFound(name),
            ModuleError::InvalidParameter(message) | ModuleError::MissingParameter(message) => {
                Error::validation("azure_orchestrated_vmss", vec![message])
            }
            other => Error::ModuleExecution {
                module: "azure_orchestrated_vmss".to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            Error::InvalidConfig {
                key: "params.yml".into(),
                message: "bad".into(),
            }
            .exit_code(),
            5
        );
        assert_eq!(Error::MissingCredentials.exit_code(), 3);
        assert_eq!(
            Error::validation("azure_orchestrated_vmss", vec!["name: required".into()]).exit_code(),
            4
        );
        assert_eq!(Error::FileNotFound("vmss.yml".into()).exit_code(), 1);
    }

    #[test]
    fn test_validation_message_lists_every_error() {
        let err = Error::validation(
            "azure_orchestrated_vmss",
            vec!["a: first".into(), "b: second".into()],
        );
        let msg = err.to_string();
        assert!(msg.contains("a: first"));
        assert!(msg.contains("b: second"));
    }

    #[test]
    fn test_parameter_errors_become_validation_errors() {
        let err: Error = ModuleError::MissingParameter("name".into()).into();
        assert_eq!(err.exit_code(), 4);

        let err: Error = ModuleError::ExecutionFailed("boom".into()).into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_error_context() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let err = res.context("reading plan").unwrap_err();
        assert_eq!(err.to_string(), "reading plan");
    }
}
