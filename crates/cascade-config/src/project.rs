//! Project Configuration (cascade.toml)
//!
//! Handles project-level configuration stored in `cascade.toml` next to the
//! root workspace manifest. Every section and key is optional; missing values
//! fall back to the global config and then to built-in defaults.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from cascade.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// External toolchain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainSection>,

    /// Step argument lists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<StepsSection>,

    /// Directory layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutSection>,

    /// Expansion settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ExpansionSection>,

    /// Retry policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySection>,

    /// Workspace processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSection>,

    /// Artifact to publish after a successful build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactSection>,
}

/// `[toolchain]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    /// Program to run (default: "cargo")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Manifest file name in every workspace (default: "Cargo.toml")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_name: Option<String>,

    /// Flag placed before the manifest path (default: "--manifest-path").
    /// An empty string omits the flag and the path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_flag: Option<String>,
}

/// `[steps]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct StepsSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<Vec<String>>,
}

/// `[layout]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LayoutSection {
    /// Per-workspace source directory (default: "src")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,

    /// Toolchain output directory (default: "target/debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Expansion output directory (default: "expanded")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion_dir: Option<PathBuf>,

    /// Extra files or directories counted as sources
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_sources: Vec<PathBuf>,
}

/// `[expansion]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ExpansionSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_empty_feature_set: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Output file extension (default: "rs")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    /// Feature count above which a capacity warning is logged (default: 8)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_warning_threshold: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_default_features: Option<bool>,
}

/// How failed cycles are handled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPolicyKind {
    /// Ask the operator after every failed cycle
    #[default]
    Interactive,
    /// Abort on the first failure
    FailFast,
    /// Retry up to `max_attempts` cycles
    MaxAttempts,
}

impl RetryPolicyKind {
    /// Parse a policy name
    pub fn parse(field: &str, value: &str) -> ConfigResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "fail-fast" => Ok(Self::FailFast),
            "max-attempts" => Ok(Self::MaxAttempts),
            other => Err(ConfigError::invalid(
                field,
                format!(
                    "must be 'interactive', 'fail-fast', or 'max-attempts', got '{}'",
                    other
                ),
            )),
        }
    }

    /// Get policy name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::FailFast => "fail-fast",
            Self::MaxAttempts => "max-attempts",
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<RetryPolicyKind>,

    /// Total cycles allowed by `max-attempts` (default: 3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<usize>,
}

/// Workspace processing order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceOrder {
    /// Root first, then members depth-first
    #[default]
    Discovery,
    /// Members before the workspace that declares them
    MembersFirst,
}

/// `[build]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<WorkspaceOrder>,
}

/// `[artifact]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSection {
    /// Build output, relative to the root workspace
    pub source: PathBuf,

    /// Copy targets; a path ending in `/` is a directory
    #[serde(default)]
    pub destinations: Vec<PathBuf>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(toolchain) = &self.toolchain {
            if let Some(program) = &toolchain.program {
                if program.trim().is_empty() {
                    return Err(ConfigError::invalid(
                        "toolchain.program",
                        "program cannot be empty",
                    ));
                }
            }
            if let Some(name) = &toolchain.manifest_name {
                if name.trim().is_empty() || name.contains(['/', '\\']) {
                    return Err(ConfigError::invalid(
                        "toolchain.manifest_name",
                        format!("must be a plain file name, got '{}'", name),
                    ));
                }
            }
        }

        if let Some(steps) = &self.steps {
            for (name, args) in [
                ("steps.format", &steps.format),
                ("steps.lint", &steps.lint),
                ("steps.test", &steps.test),
                ("steps.build", &steps.build),
                ("steps.expand", &steps.expand),
            ] {
                if args.as_ref().map_or(false, |a| a.is_empty()) {
                    return Err(ConfigError::invalid(
                        name,
                        "command needs at least a subcommand",
                    ));
                }
            }
        }

        if let Some(expansion) = &self.expansion {
            if let Some(extension) = &expansion.extension {
                if extension.contains(['/', '\\']) || extension.starts_with('.') {
                    return Err(ConfigError::invalid(
                        "expansion.extension",
                        format!("expected an extension like 'rs', got '{}'", extension),
                    ));
                }
            }
        }

        if let Some(retry) = &self.retry {
            validate_max_attempts("retry.max_attempts", retry.max_attempts)?;
        }

        if let Some(artifact) = &self.artifact {
            if artifact.source.as_os_str().is_empty() {
                return Err(ConfigError::invalid(
                    "artifact.source",
                    "source cannot be empty",
                ));
            }
            if artifact.destinations.is_empty() {
                return Err(ConfigError::invalid(
                    "artifact.destinations",
                    "at least one destination is required",
                ));
            }
        }

        Ok(())
    }

    /// Get the toolchain program, if present
    pub fn program(&self) -> Option<&str> {
        self.toolchain.as_ref().and_then(|t| t.program.as_deref())
    }

    /// Get the retry policy, if present
    pub fn retry_policy(&self) -> Option<RetryPolicyKind> {
        self.retry.as_ref().and_then(|r| r.policy)
    }

    /// Get the attempt limit, if present
    pub fn max_attempts(&self) -> Option<usize> {
        self.retry.as_ref().and_then(|r| r.max_attempts)
    }

    /// Set the toolchain program
    pub fn set_program(&mut self, program: String) {
        self.toolchain.get_or_insert_with(Default::default).program = Some(program);
    }

    /// Set the retry policy
    pub fn set_retry_policy(&mut self, policy: RetryPolicyKind) {
        self.retry.get_or_insert_with(Default::default).policy = Some(policy);
    }

    /// Set the attempt limit
    pub fn set_max_attempts(&mut self, max_attempts: usize) {
        self.retry.get_or_insert_with(Default::default).max_attempts = Some(max_attempts);
    }

    /// Set the output directory
    pub fn set_output_dir(&mut self, output_dir: PathBuf) {
        self.layout.get_or_insert_with(Default::default).output_dir = Some(output_dir);
    }
}

/// At least one attempt is required
pub(crate) fn validate_max_attempts(field: &str, value: Option<usize>) -> ConfigResult<()> {
    if value == Some(0) {
        return Err(ConfigError::invalid(field, "must be at least 1"));
    }
    Ok(())
}
