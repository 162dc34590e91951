//! Global Configuration (~/.cascade/config.toml)
//!
//! Handles user-level defaults stored in `~/.cascade/config.toml`.

use crate::project::{validate_max_attempts, RetryPolicyKind};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.cascade/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Default toolchain program
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,

    /// Default retry policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<RetryPolicyKind>,

    /// Default attempt limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<usize>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(defaults) = &self.defaults {
            if let Some(toolchain) = &defaults.toolchain {
                if toolchain.trim().is_empty() {
                    return Err(ConfigError::invalid(
                        "defaults.toolchain",
                        "toolchain cannot be empty",
                    ));
                }
            }
            validate_max_attempts("defaults.max_attempts", defaults.max_attempts)?;
        }
        Ok(())
    }

    /// Get the global config file path (~/.cascade/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".cascade").join("config.toml"))
    }

    /// Get the default toolchain
    pub fn default_toolchain(&self) -> Option<&str> {
        self.defaults.as_ref().and_then(|d| d.toolchain.as_deref())
    }

    /// Get the default retry policy
    pub fn default_policy(&self) -> Option<RetryPolicyKind> {
        self.defaults.as_ref().and_then(|d| d.policy)
    }

    /// Get the default attempt limit
    pub fn default_max_attempts(&self) -> Option<usize> {
        self.defaults.as_ref().and_then(|d| d.max_attempts)
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        let Some(theirs) = &other.defaults else {
            return;
        };
        let ours = self.defaults.get_or_insert_with(Default::default);
        if theirs.toolchain.is_some() {
            ours.toolchain = theirs.toolchain.clone();
        }
        if theirs.policy.is_some() {
            ours.policy = theirs.policy;
        }
        if theirs.max_attempts.is_some() {
            ours.max_attempts = theirs.max_attempts;
        }
    }
}
