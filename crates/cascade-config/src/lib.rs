//! Cascade Configuration System
//!
//! Provides configuration management for cascade builds:
//! - Project configuration (cascade.toml in the root workspace)
//! - Global user configuration (~/.cascade/config.toml)
//! - Environment variable overrides (CASCADE_*)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (~/.cascade/config.toml)
//! 3. Project config (./cascade.toml, found by walking up)
//! 4. Environment variables (CASCADE_*)
//! 5. CLI flags (applied by the caller)
//!
//! # Example
//!
//! ```no_run
//! use cascade_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("toolchain: {}", config.program());
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "cascade.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::{DefaultsConfig, GlobalConfig};
pub use loader::{Config, ConfigLoader};
pub use project::{
    ArtifactSection, BuildSection, ExpansionSection, LayoutSection, ProjectConfig,
    RetryPolicyKind, RetrySection, StepsSection, ToolchainSection, WorkspaceOrder,
};
