//! Configuration module for rustible-vmss
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/rustible-vmss/config.toml)
//! - User configuration (~/.rustible-vmss/config.toml)
//! - Project configuration (./rustible-vmss.toml)
//! - Environment variables
//! - Command-line arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::modules::cloud::azure::API_VERSION;

/// Default Azure Resource Manager endpoint
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Management API settings
    pub azure: AzureConfig,

    /// Per-operation timeouts
    pub timeouts: TimeoutsConfig,

    /// Resource behaviour toggles
    pub features: FeaturesConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Management API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// Subscription all resources live in
    pub subscription_id: Option<String>,

    /// Resource Manager endpoint
    pub endpoint: String,

    /// Compute API version
    pub api_version: String,

    /// Bearer token; prefer AZURE_ACCESS_TOKEN over storing it on disk
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Timeout for a single HTTP request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Poll interval for long-running operations without a Retry-After header
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            subscription_id: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: API_VERSION.to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Per-operation timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    #[serde(with = "humantime_serde")]
    pub create: Duration,
    #[serde(with = "humantime_serde")]
    pub read: Duration,
    #[serde(with = "humantime_serde")]
    pub update: Duration,
    #[serde(with = "humantime_serde")]
    pub delete: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(60 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(60 * 60),
            delete: Duration::from_secs(60 * 60),
        }
    }
}

/// Resource behaviour toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Scale the set to zero instances before deleting it
    pub scale_to_zero_before_deletion: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            scale_to_zero_before_deletion: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when neither RUST_LOG nor -v is given
    pub log_level: String,

    /// Log format: "pretty" or "json"
    pub log_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Whether structured JSON logs were requested
    pub fn is_json(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        // Load from standard locations
        let config_paths = Self::get_config_paths(config_path);

        for path in config_paths {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Explicit path takes priority
        if let Some(path) = explicit_path {
            paths.push(path.clone());
            return paths;
        }

        paths.push(PathBuf::from("/etc/rustible-vmss/config.toml"));

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".rustible-vmss/config.toml"));
        }

        paths.push(PathBuf::from("rustible-vmss.toml"));

        if let Ok(env_config) = std::env::var("RUSTIBLE_VMSS_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; the other side wins for non-default values
    fn merge(&self, other: Config) -> Config {
        let default_azure = AzureConfig::default();
        Config {
            azure: AzureConfig {
                subscription_id: other
                    .azure
                    .subscription_id
                    .or_else(|| self.azure.subscription_id.clone()),
                endpoint: if other.azure.endpoint != default_azure.endpoint {
                    other.azure.endpoint
                } else {
                    self.azure.endpoint.clone()
                },
                api_version: if other.azure.api_version != default_azure.api_version {
                    other.azure.api_version
                } else {
                    self.azure.api_version.clone()
                },
                access_token: other
                    .azure
                    .access_token
                    .or_else(|| self.azure.access_token.clone()),
                request_timeout: if other.azure.request_timeout != default_azure.request_timeout {
                    other.azure.request_timeout
                } else {
                    self.azure.request_timeout
                },
                poll_interval: if other.azure.poll_interval != default_azure.poll_interval {
                    other.azure.poll_interval
                } else {
                    self.azure.poll_interval
                },
            },
            timeouts: other.timeouts,
            features: other.features,
            logging: other.logging,
        }
    }

    /// Apply environment variable overrides
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(id) =
            std::env::var("AZURE_SUBSCRIPTION_ID").or_else(|_| std::env::var("ARM_SUBSCRIPTION_ID"))
        {
            if !id.is_empty() {
                self.azure.subscription_id = Some(id);
            }
        }

        if let Ok(token) =
            std::env::var("AZURE_ACCESS_TOKEN").or_else(|_| std::env::var("ARM_ACCESS_TOKEN"))
        {
            if !token.is_empty() {
                self.azure.access_token = Some(token);
            }
        }

        if let Ok(endpoint) = std::env::var("RUSTIBLE_VMSS_ENDPOINT") {
            self.azure.endpoint = endpoint;
        }

        if let Ok(level) = std::env::var("RUSTIBLE_VMSS_LOG_LEVEL") {
            self.logging.log_level = level;
        }

        if let Ok(format) = std::env::var("RUSTIBLE_VMSS_LOG_FORMAT") {
            self.logging.log_format = format;
        }
    }

    /// Load from a specific file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        Config::default().merge_from_file(&path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.azure.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.azure.api_version, "2021-07-01");
        assert_eq!(config.timeouts.create, Duration::from_secs(3600));
        assert_eq!(config.timeouts.read, Duration::from_secs(300));
        assert!(config.features.scale_to_zero_before_deletion);
    }

    #[test]
    fn test_config_merge() {
        let base = Config {
            azure: AzureConfig {
                subscription_id: Some("base-sub".to_string()),
                ..AzureConfig::default()
            },
            ..Config::default()
        };
        let other = Config {
            azure: AzureConfig {
                endpoint: "http://localhost:8080".to_string(),
                ..AzureConfig::default()
            },
            ..Config::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.azure.subscription_id.as_deref(), Some("base-sub"));
        assert_eq!(merged.azure.endpoint, "http://localhost:8080");
    }

    #[test]
    fn test_durations_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [timeouts]
            create = "90m"
            delete = "2h"

            [azure]
            poll_interval = "5s"
            "#,
        )
        .unwrap();
        assert_eq!(config.timeouts.create, Duration::from_secs(90 * 60));
        assert_eq!(config.timeouts.delete, Duration::from_secs(2 * 60 * 60));
        assert_eq!(config.timeouts.read, Duration::from_secs(300));
        assert_eq!(config.azure.poll_interval, Duration::from_secs(5));
    }
}
