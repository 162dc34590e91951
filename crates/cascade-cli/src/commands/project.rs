//! Shared project loading: `cascade.toml` into a `BuildConfig`

use anyhow::{bail, Context, Result};
use cascade_build::{
    ArtifactSpec, BuildConfig, CommandSet, ExpansionConfig, Layout, Orchestrator,
    ProcessingOrder, RetryPolicy,
};
use cascade_config::{Config, ConfigLoader, RetryPolicyKind, WorkspaceOrder};
use std::path::{Path, PathBuf};

/// A loaded project: root directory plus merged configuration
#[derive(Debug)]
pub struct Project {
    /// Root workspace directory
    pub root: PathBuf,
    /// Merged global/project/env configuration
    pub config: Config,
}

impl Project {
    /// Load configuration starting at `dir` (current directory when `None`)
    ///
    /// The root is the directory holding `cascade.toml`, or `dir` itself when
    /// no config file exists above it.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let start = match dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        if !start.is_dir() {
            bail!("Not a directory: {}", start.display());
        }

        let config = ConfigLoader::new()
            .load_from_directory(&start)
            .context("Failed to load cascade configuration")?;

        let root = config
            .project_root()
            .map(Path::to_path_buf)
            .unwrap_or(start);

        Ok(Self { root, config })
    }

    /// Translate the merged configuration into build settings
    pub fn build_config(&self) -> BuildConfig {
        let config = &self.config;
        let commands = CommandSet {
            program: config.program().to_string(),
            manifest_flag: config.manifest_flag().map(str::to_string),
            format: config.format_command(),
            lint: config.lint_command(),
            test: config.test_command(),
            build: config.build_command(),
            expand: config.expand_command(),
            no_default_features: config.no_default_features(),
        };

        let layout = Layout {
            source_dir: config.source_dir(),
            output_dir: config.output_dir(),
            expansion_dir: config.expansion_dir(),
            extra_sources: config.extra_sources().to_vec(),
        };

        let expansion = ExpansionConfig {
            enabled: config.expansion_enabled(),
            include_empty_feature_set: config.include_empty_feature_set(),
            parallel: config.parallel_expansion(),
            extension: config.expansion_extension(),
            feature_warning_threshold: config.feature_warning_threshold(),
        };

        BuildConfig {
            manifest_name: config.manifest_name().to_string(),
            commands,
            layout,
            expansion,
            order: processing_order(config.order()),
            artifact: config.artifact().map(|a| ArtifactSpec {
                source: a.source.clone(),
                destinations: a.destinations.clone(),
            }),
        }
    }

    /// Orchestrator over the project root with the process toolchain
    pub fn orchestrator(&self, config: BuildConfig) -> Orchestrator {
        Orchestrator::new(&self.root, config)
    }
}

/// Map the config-file order onto the build crate's order
pub fn processing_order(order: WorkspaceOrder) -> ProcessingOrder {
    match order {
        WorkspaceOrder::Discovery => ProcessingOrder::Discovery,
        WorkspaceOrder::MembersFirst => ProcessingOrder::MembersFirst,
    }
}

/// Non-interactive policy for a configured kind; `None` for interactive
pub fn automatic_policy(kind: RetryPolicyKind, max_attempts: usize) -> Option<RetryPolicy> {
    match kind {
        RetryPolicyKind::Interactive => None,
        RetryPolicyKind::FailFast => Some(RetryPolicy::FailFast),
        RetryPolicyKind::MaxAttempts => Some(RetryPolicy::MaxAttempts(max_attempts)),
    }
}

/// Render `path` relative to `root` when it lies inside it
pub fn display_relative(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
