//! Artifact publishing
use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which build output to publish and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Build output, relative to the root workspace unless absolute
    pub source: PathBuf,
    /// Copy targets; an existing directory or a path ending in `/` receives
    /// the source file name
    pub destinations: Vec<PathBuf>,
}

impl ArtifactSpec {
    /// Create a new artifact spec
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destinations: Vec::new(),
        }
    }

    /// Add a destination
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destinations.push(destination.into());
        self
    }
}

/// A published artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    /// Resolved source path
    pub source: PathBuf,
    /// Files that were written
    pub destinations: Vec<PathBuf>,
    /// Size of the artifact in bytes
    pub size: u64,
}

/// Copies the build output to its consumer locations
#[derive(Debug, Clone)]
pub struct ArtifactPublisher {
    base_dir: PathBuf,
    spec: ArtifactSpec,
}

impl ArtifactPublisher {
    /// Create a publisher resolving relative paths against `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>, spec: ArtifactSpec) -> Self {
        Self {
            base_dir: base_dir.into(),
            spec,
        }
    }

    /// Absolute path of the expected build output
    pub fn source_path(&self) -> PathBuf {
        self.resolve(&self.spec.source)
    }

    /// Copy the artifact to every destination
    pub fn publish(&self) -> BuildResult<PublishedArtifact> {
        if self.spec.destinations.is_empty() {
            return Err(BuildError::InvalidConfig(
                "artifact needs at least one destination".to_string(),
            ));
        }
        let source = self.source_path();
        if !source.is_file() {
            return Err(BuildError::artifact_missing(source));
        }

        let file_name = source
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| BuildError::artifact_missing(&source))?;

        let mut written = Vec::with_capacity(self.spec.destinations.len());
        let mut size = 0;

        for destination in &self.spec.destinations {
            let mut target = self.resolve(destination);
            if target.is_dir() || names_directory(destination) {
                target.push(&file_name);
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }

            size = fs::copy(&source, &target).map_err(|e| BuildError::io(&target, e))?;
            info!("published {} -> {}", source.display(), target.display());
            written.push(target);
        }

        Ok(PublishedArtifact {
            source,
            destinations: written,
            size,
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

fn names_directory(path: &Path) -> bool {
    path.as_os_str()
        .to_string_lossy()
        .ends_with(std::path::is_separator)
}
