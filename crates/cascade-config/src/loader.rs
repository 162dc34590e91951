//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{ArtifactSection, ProjectConfig, RetryPolicyKind, WorkspaceOrder};
use crate::{ConfigError, ConfigResult, PROJECT_CONFIG_FILE};
use std::env;
use std::path::{Path, PathBuf};

/// Default toolchain program
pub const DEFAULT_PROGRAM: &str = "cargo";
/// Default manifest file name
pub const DEFAULT_MANIFEST_NAME: &str = "Cargo.toml";
/// Default manifest flag
pub const DEFAULT_MANIFEST_FLAG: &str = "--manifest-path";
/// Default attempt limit for `max-attempts`
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Default feature capacity warning threshold
pub const DEFAULT_FEATURE_WARNING_THRESHOLD: usize = 8;

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.cascade/config.toml) - lowest priority
/// 2. Project config (./cascade.toml) - overrides global
/// 3. Environment variables (CASCADE_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration (with environment overrides applied)
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Directory where cascade.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Read the global config from `path` instead of the home directory
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find cascade.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config); defaults when none is found
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.is_file() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.cascade/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                // No home directory means no global config
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            },
        };

        // Global config is optional - if it doesn't exist, return default
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognised: CASCADE_TOOLCHAIN, CASCADE_POLICY, CASCADE_MAX_ATTEMPTS,
    /// CASCADE_OUTPUT_DIR
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Some(toolchain) = env_value("CASCADE_TOOLCHAIN") {
            config.set_program(toolchain);
        }

        if let Some(policy) = env_value("CASCADE_POLICY") {
            config.set_retry_policy(RetryPolicyKind::parse("CASCADE_POLICY", &policy)?);
        }

        if let Some(attempts) = env_value("CASCADE_MAX_ATTEMPTS") {
            let attempts = attempts
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ConfigError::invalid(
                        "CASCADE_MAX_ATTEMPTS",
                        format!("expected a positive integer, got '{}'", attempts),
                    )
                })?;
            config.set_max_attempts(attempts);
        }

        if let Some(output_dir) = env_value("CASCADE_OUTPUT_DIR") {
            config.set_output_dir(PathBuf::from(output_dir));
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.cascade)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".cascade"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-empty environment variable
fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a cascade.toml was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Toolchain program (project > global > default)
    pub fn program(&self) -> &str {
        self.project
            .program()
            .or_else(|| self.global.default_toolchain())
            .unwrap_or(DEFAULT_PROGRAM)
    }

    /// Manifest file name
    pub fn manifest_name(&self) -> &str {
        self.project
            .toolchain
            .as_ref()
            .and_then(|t| t.manifest_name.as_deref())
            .unwrap_or(DEFAULT_MANIFEST_NAME)
    }

    /// Manifest flag; `None` when disabled with an empty string
    pub fn manifest_flag(&self) -> Option<&str> {
        let flag = self
            .project
            .toolchain
            .as_ref()
            .and_then(|t| t.manifest_flag.as_deref())
            .unwrap_or(DEFAULT_MANIFEST_FLAG);
        (!flag.is_empty()).then_some(flag)
    }

    /// Format step arguments
    pub fn format_command(&self) -> Vec<String> {
        self.step(|s| s.format.as_ref(), "fmt")
    }

    /// Lint step arguments
    pub fn lint_command(&self) -> Vec<String> {
        self.step(|s| s.lint.as_ref(), "clippy")
    }

    /// Test step arguments
    pub fn test_command(&self) -> Vec<String> {
        self.step(|s| s.test.as_ref(), "test")
    }

    /// Build step arguments
    pub fn build_command(&self) -> Vec<String> {
        self.step(|s| s.build.as_ref(), "build")
    }

    /// Expansion arguments
    pub fn expand_command(&self) -> Vec<String> {
        self.step(|s| s.expand.as_ref(), "expand")
    }

    fn step<F>(&self, get: F, default: &str) -> Vec<String>
    where
        F: Fn(&crate::project::StepsSection) -> Option<&Vec<String>>,
    {
        self.project
            .steps
            .as_ref()
            .and_then(get)
            .cloned()
            .unwrap_or_else(|| vec![default.to_string()])
    }

    /// Per-workspace source directory
    pub fn source_dir(&self) -> PathBuf {
        self.layout(|l| l.source_dir.as_ref(), "src")
    }

    /// Toolchain output directory
    pub fn output_dir(&self) -> PathBuf {
        self.layout(|l| l.output_dir.as_ref(), "target/debug")
    }

    /// Expansion output directory
    pub fn expansion_dir(&self) -> PathBuf {
        self.layout(|l| l.expansion_dir.as_ref(), "expanded")
    }

    /// Extra source paths
    pub fn extra_sources(&self) -> &[PathBuf] {
        self.project
            .layout
            .as_ref()
            .map(|l| l.extra_sources.as_slice())
            .unwrap_or(&[])
    }

    fn layout<F>(&self, get: F, default: &str) -> PathBuf
    where
        F: Fn(&crate::project::LayoutSection) -> Option<&PathBuf>,
    {
        self.project
            .layout
            .as_ref()
            .and_then(get)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(default))
    }

    /// Whether expansion runs at all
    pub fn expansion_enabled(&self) -> bool {
        self.expansion(|e| e.enabled).unwrap_or(true)
    }

    /// Whether the empty feature subset is expanded
    pub fn include_empty_feature_set(&self) -> bool {
        self.expansion(|e| e.include_empty_feature_set).unwrap_or(true)
    }

    /// Whether expansion jobs run in parallel
    pub fn parallel_expansion(&self) -> bool {
        self.expansion(|e| e.parallel).unwrap_or(false)
    }

    /// Expansion output extension
    pub fn expansion_extension(&self) -> String {
        self.project
            .expansion
            .as_ref()
            .and_then(|e| e.extension.clone())
            .unwrap_or_else(|| "rs".to_string())
    }

    /// Feature capacity warning threshold
    pub fn feature_warning_threshold(&self) -> usize {
        self.expansion(|e| e.feature_warning_threshold)
            .unwrap_or(DEFAULT_FEATURE_WARNING_THRESHOLD)
    }

    /// Whether feature-gated expansions disable default features
    pub fn no_default_features(&self) -> bool {
        self.expansion(|e| e.no_default_features).unwrap_or(true)
    }

    fn expansion<T, F>(&self, get: F) -> Option<T>
    where
        F: Fn(&crate::project::ExpansionSection) -> Option<T>,
    {
        self.project.expansion.as_ref().and_then(get)
    }

    /// Retry policy (project > global > interactive)
    pub fn retry_policy(&self) -> RetryPolicyKind {
        self.project
            .retry_policy()
            .or_else(|| self.global.default_policy())
            .unwrap_or_default()
    }

    /// Attempt limit (project > global > 3)
    pub fn max_attempts(&self) -> usize {
        self.project
            .max_attempts()
            .or_else(|| self.global.default_max_attempts())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    /// Workspace processing order
    pub fn order(&self) -> WorkspaceOrder {
        self.project
            .build
            .as_ref()
            .and_then(|b| b.order)
            .unwrap_or_default()
    }

    /// Artifact to publish
    pub fn artifact(&self) -> Option<&ArtifactSection> {
        self.project.artifact.as_ref()
    }
}
