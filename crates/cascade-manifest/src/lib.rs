//! Cascade workspace manifests
//!
//! Reads the per-workspace descriptor file (`Cargo.toml` by default) into the
//! small model the orchestrator needs: package name, optional features,
//! binary targets and nested workspace members.

pub mod manifest;

pub use manifest::{Manifest, DEFAULT_FEATURE, DEFAULT_MANIFEST_NAME};

use std::path::PathBuf;

/// Manifest errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("No manifest found at {0}")]
    NotFound(PathBuf),

    #[error("Malformed manifest {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to read manifest {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl ManifestError {
    /// Create a malformed manifest error
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
