//! Manifest parsing and types

use crate::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// File name looked up in every workspace root unless configured otherwise
pub const DEFAULT_MANIFEST_NAME: &str = "Cargo.toml";

/// Feature key that is never enumerated
pub const DEFAULT_FEATURE: &str = "default";

/// Parsed workspace manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// `package.name`, never empty
    pub package_name: String,
    /// Keys of `[features]` without `default`
    pub feature_names: BTreeSet<String>,
    /// `[[bin]]` names in declaration order
    pub binary_names: Vec<String>,
    /// `workspace.members` in declaration order
    pub member_paths: Vec<PathBuf>,
    /// `workspace.exclude`
    pub excluded_paths: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    package: Option<RawPackage>,
    #[serde(default)]
    features: BTreeMap<String, toml::Value>,
    #[serde(default)]
    bin: Vec<RawBinary>,
    #[serde(default)]
    workspace: Option<RawWorkspace>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBinary {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWorkspace {
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
}

impl Manifest {
    /// Load the manifest named `file_name` from a workspace root
    pub fn load(workspace_root: &Path, file_name: &str) -> Result<Self> {
        Self::from_file(&workspace_root.join(file_name))
    }

    /// Load a manifest from an explicit file path
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                ManifestError::NotFound(path.to_path_buf())
            } else {
                ManifestError::Io {
                    path: path.to_path_buf(),
                    error,
                }
            }
        })?;

        Self::parse(&content, path)
    }

    /// Parse manifest text; `origin` is only used for error reporting
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let raw: RawManifest =
            toml::from_str(content).map_err(|e| ManifestError::malformed(origin, e.message()))?;

        let package_name = raw
            .package
            .and_then(|p| p.name)
            .map(|name| name.trim().to_string())
            .unwrap_or_default();

        if package_name.is_empty() {
            return Err(ManifestError::malformed(
                origin,
                "missing required field `package.name`",
            ));
        }

        let feature_names = raw
            .features
            .into_keys()
            .filter(|name| name != DEFAULT_FEATURE)
            .collect();

        let mut binary_names: Vec<String> = Vec::with_capacity(raw.bin.len());
        for (index, bin) in raw.bin.into_iter().enumerate() {
            let name = bin.name.unwrap_or_default();
            if name.is_empty() {
                return Err(ManifestError::malformed(
                    origin,
                    format!("`bin[{}]` has no name", index),
                ));
            }
            if binary_names.contains(&name) {
                return Err(ManifestError::malformed(
                    origin,
                    format!("binary `{}` is declared more than once", name),
                ));
            }
            binary_names.push(name);
        }

        let (member_paths, excluded_paths) = match raw.workspace {
            Some(ws) => (
                ws.members.into_iter().map(PathBuf::from).collect(),
                ws.exclude.into_iter().map(PathBuf::from).collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        Ok(Self {
            package_name,
            feature_names,
            binary_names,
            member_paths,
            excluded_paths,
        })
    }

    /// Whether any optional features are declared
    pub fn has_features(&self) -> bool {
        !self.feature_names.is_empty()
    }

    /// Whether any binary targets are declared
    pub fn has_binaries(&self) -> bool {
        !self.binary_names.is_empty()
    }

    /// Whether this manifest declares nested members
    pub fn has_members(&self) -> bool {
        !self.member_paths.is_empty()
    }

    /// Check if a member path is listed in `workspace.exclude`
    pub fn is_excluded(&self, member: &Path) -> bool {
        self.excluded_paths
            .iter()
            .any(|excluded| normalize(excluded) == normalize(member))
    }
}

/// Drop `.` components and trailing separators for comparison
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}
