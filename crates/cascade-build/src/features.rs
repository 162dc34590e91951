//! Feature matrix expansion
//!
//! Every subset of a workspace's optional features is crossed with every
//! binary target (or the library when there are none). Subsets are built with
//! combinations over the sorted feature names, so each subset is already in
//! canonical order and appears exactly once.

use crate::error::{BuildError, BuildResult};
use crate::workspace::Workspace;
use itertools::Itertools;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

/// Feature counts above this are refused outright (2^24 jobs per target)
pub const MAX_FEATURES: usize = 24;

/// What a single expansion job targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum ExpansionTarget {
    /// The workspace library
    Library,
    /// A named binary target
    Binary(String),
}

impl ExpansionTarget {
    /// Binary name, if any
    pub fn binary_name(&self) -> Option<&str> {
        match self {
            Self::Library => None,
            Self::Binary(name) => Some(name),
        }
    }
}

impl std::fmt::Display for ExpansionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Library => write!(f, "lib"),
            Self::Binary(name) => write!(f, "bin {}", name),
        }
    }
}

/// One toolchain expansion invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpansionJob {
    /// Workspace root
    pub workspace: PathBuf,
    /// Workspace manifest
    pub manifest_path: PathBuf,
    /// Package name
    pub package_name: String,
    /// Enabled features, sorted
    pub features: Vec<String>,
    /// Library or binary
    pub target: ExpansionTarget,
    /// The workspace declares optional features, so default features are
    /// switched off and the subset is passed explicitly
    pub feature_gated: bool,
}

impl ExpansionJob {
    /// Deterministic file name: `<pkg>[_features_<a,b>][_bin_<name>].<ext>`
    pub fn output_file_name(&self, extension: &str) -> String {
        let mut name = self.package_name.clone();
        if !self.features.is_empty() {
            name.push_str("_features_");
            name.push_str(&self.features.join(","));
        }
        if let Some(binary) = self.target.binary_name() {
            name.push_str("_bin_");
            name.push_str(binary);
        }
        if !extension.is_empty() {
            name.push('.');
            name.push_str(extension);
        }
        name
    }

    /// `--features` value
    pub fn features_arg(&self) -> String {
        self.features.join(",")
    }
}

/// Enumerates expansion jobs for workspaces
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    include_empty: bool,
    warning_threshold: usize,
}

impl FeatureMatrix {
    /// Create an expander that includes the empty subset
    pub fn new() -> Self {
        Self {
            include_empty: true,
            warning_threshold: 8,
        }
    }

    /// Whether the empty feature subset is expanded when features exist
    pub fn with_empty_subset(mut self, include_empty: bool) -> Self {
        self.include_empty = include_empty;
        self
    }

    /// Feature count above which a capacity warning is logged
    pub fn with_warning_threshold(mut self, threshold: usize) -> Self {
        self.warning_threshold = threshold;
        self
    }

    /// Number of jobs [`FeatureMatrix::expand`] would produce
    pub fn job_count(&self, workspace: &Workspace) -> u128 {
        let features = workspace.manifest.feature_names.len() as u32;
        let mut subsets = 1u128.checked_shl(features).unwrap_or(u128::MAX);
        if features > 0 && !self.include_empty {
            subsets -= 1;
        }
        let targets = workspace.manifest.binary_names.len().max(1) as u128;
        subsets.saturating_mul(targets)
    }

    /// Enumerate every (feature subset, target) job for a workspace
    pub fn expand(&self, workspace: &Workspace) -> BuildResult<Vec<ExpansionJob>> {
        let manifest = &workspace.manifest;
        let feature_count = manifest.feature_names.len();

        if feature_count > MAX_FEATURES {
            return Err(BuildError::FeatureMatrixTooLarge {
                package: manifest.package_name.clone(),
                features: feature_count,
                jobs: self.job_count(workspace).to_string(),
            });
        }
        if feature_count > self.warning_threshold {
            warn!(
                "{} declares {} features; expanding {} jobs",
                manifest.package_name,
                feature_count,
                self.job_count(workspace)
            );
        }

        let names: Vec<String> = manifest.feature_names.iter().cloned().collect();
        let subsets = feature_subsets(&names, self.include_empty || names.is_empty());

        let targets: Vec<ExpansionTarget> = if manifest.binary_names.is_empty() {
            vec![ExpansionTarget::Library]
        } else {
            manifest
                .binary_names
                .iter()
                .cloned()
                .map(ExpansionTarget::Binary)
                .collect()
        };

        let jobs = subsets
            .iter()
            .cartesian_product(targets.iter())
            .map(|(features, target)| ExpansionJob {
                workspace: workspace.root.clone(),
                manifest_path: workspace.manifest_path.clone(),
                package_name: manifest.package_name.clone(),
                features: features.clone(),
                target: target.clone(),
                feature_gated: !names.is_empty(),
            })
            .collect();

        Ok(jobs)
    }
}

impl Default for FeatureMatrix {
    fn default() -> Self {
        Self::new()
    }
}

/// All subsets of `names` by increasing size, each sorted
pub fn feature_subsets(names: &[String], include_empty: bool) -> Vec<Vec<String>> {
    let mut sorted = names.to_vec();
    sorted.sort();
    sorted.dedup();

    let start = if include_empty { 0 } else { 1 };
    (start..=sorted.len())
        .flat_map(|size| sorted.iter().cloned().combinations(size))
        .collect()
}
