//! Resolved build configuration
use crate::error::{BuildError, BuildResult};
use crate::features::{FeatureMatrix, MAX_FEATURES};
use crate::publish::ArtifactSpec;
use crate::toolchain::CommandSet;
use crate::workspace::ProcessingOrder;
use cascade_manifest::DEFAULT_MANIFEST_NAME;
use std::path::{Path, PathBuf};

/// Directory layout, relative to the root workspace unless absolute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Per-workspace source directory
    pub source_dir: PathBuf,
    /// Shared toolchain output directory
    pub output_dir: PathBuf,
    /// Expansion output directory
    pub expansion_dir: PathBuf,
    /// Extra files or directories counted as sources
    pub extra_sources: Vec<PathBuf>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            output_dir: PathBuf::from("target/debug"),
            expansion_dir: PathBuf::from("expanded"),
            extra_sources: Vec::new(),
        }
    }
}

impl Layout {
    /// Output directory resolved against `root`
    pub fn output_dir_in(&self, root: &Path) -> PathBuf {
        resolve(root, &self.output_dir)
    }

    /// Expansion directory resolved against `root`
    pub fn expansion_dir_in(&self, root: &Path) -> PathBuf {
        resolve(root, &self.expansion_dir)
    }

    /// Extra sources resolved against `root`
    pub fn extra_sources_in(&self, root: &Path) -> Vec<PathBuf> {
        self.extra_sources.iter().map(|p| resolve(root, p)).collect()
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Expansion settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionConfig {
    /// Run expansion jobs at all
    pub enabled: bool,
    /// Expand the empty feature subset when a workspace declares features
    pub include_empty_feature_set: bool,
    /// Run the jobs of one workspace on the rayon pool
    pub parallel: bool,
    /// Output file extension
    pub extension: String,
    /// Feature count above which a capacity warning is logged
    pub feature_warning_threshold: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_empty_feature_set: true,
            parallel: false,
            extension: "rs".to_string(),
            feature_warning_threshold: 8,
        }
    }
}

impl ExpansionConfig {
    /// Feature matrix configured from these settings
    pub fn matrix(&self) -> FeatureMatrix {
        FeatureMatrix::new()
            .with_empty_subset(self.include_empty_feature_set)
            .with_warning_threshold(self.feature_warning_threshold)
    }
}

/// Build configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Manifest file name looked up in every workspace
    pub manifest_name: String,
    /// Toolchain commands
    pub commands: CommandSet,
    /// Directory layout
    pub layout: Layout,
    /// Expansion settings
    pub expansion: ExpansionConfig,
    /// Workspace processing order
    pub order: ProcessingOrder,
    /// Artifact to publish after a successful loop
    pub artifact: Option<ArtifactSpec>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            commands: CommandSet::default(),
            layout: Layout::default(),
            expansion: ExpansionConfig::default(),
            order: ProcessingOrder::default(),
            artifact: None,
        }
    }
}

impl BuildConfig {
    /// Set processing order
    pub fn with_order(mut self, order: ProcessingOrder) -> Self {
        self.order = order;
        self
    }

    /// Set the artifact to publish
    pub fn with_artifact(mut self, artifact: ArtifactSpec) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Enable/disable expansion
    pub fn with_expansion(mut self, enabled: bool) -> Self {
        self.expansion.enabled = enabled;
        self
    }

    /// Set the toolchain commands
    pub fn with_commands(mut self, commands: CommandSet) -> Self {
        self.commands = commands;
        self
    }

    /// Check the configuration before anything runs
    pub fn validate(&self) -> BuildResult<()> {
        if self.manifest_name.trim().is_empty() {
            return Err(BuildError::InvalidConfig(
                "manifest name cannot be empty".to_string(),
            ));
        }
        self.commands.validate()?;

        if self.expansion.feature_warning_threshold > MAX_FEATURES {
            return Err(BuildError::InvalidConfig(format!(
                "feature warning threshold {} exceeds the hard limit of {}",
                self.expansion.feature_warning_threshold, MAX_FEATURES
            )));
        }
        if let Some(artifact) = &self.artifact {
            if artifact.source.as_os_str().is_empty() {
                return Err(BuildError::InvalidConfig(
                    "artifact source cannot be empty".to_string(),
                ));
            }
            if artifact.destinations.is_empty() {
                return Err(BuildError::InvalidConfig(format!(
                    "artifact {} needs at least one destination",
                    artifact.source.display()
                )));
            }
        }
        Ok(())
    }
}
