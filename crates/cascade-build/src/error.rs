/// Build orchestration error types
use cascade_manifest::ManifestError;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No manifest found at {path}")]
    ManifestNotFound { path: PathBuf },

    #[error("Malformed manifest {path}: {reason}")]
    ManifestMalformed { path: PathBuf, reason: String },

    #[error("Cyclic workspace graph: {0}")]
    CyclicWorkspaceGraph(String),

    #[error("Command `{command}` failed with {}", describe_exit(.exit_code))]
    ExternalCommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Failed to start `{command}`: {error}")]
    CommandSpawn { command: String, error: String },

    #[error("Expected build artifact missing: {path}")]
    ArtifactMissing { path: PathBuf },

    #[error(
        "Feature matrix for '{package}' is too large: {features} features would need {jobs} expansion jobs"
    )]
    FeatureMatrixTooLarge {
        package: String,
        features: usize,
        jobs: String,
    },

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a spawn error for a command line
    pub fn spawn(command: impl Into<String>, error: impl ToString) -> Self {
        Self::CommandSpawn {
            command: command.into(),
            error: error.to_string(),
        }
    }

    /// Create an artifact missing error
    pub fn artifact_missing(path: impl Into<PathBuf>) -> Self {
        Self::ArtifactMissing { path: path.into() }
    }

    /// Whether this error is one of the fatal pre-loop errors
    pub fn is_discovery_error(&self) -> bool {
        matches!(
            self,
            Self::ManifestNotFound { .. }
                | Self::ManifestMalformed { .. }
                | Self::CyclicWorkspaceGraph(_)
        )
    }
}

impl From<ManifestError> for BuildError {
    fn from(error: ManifestError) -> Self {
        match error {
            ManifestError::NotFound(path) => Self::ManifestNotFound { path },
            ManifestError::Malformed { path, reason } => Self::ManifestMalformed { path, reason },
            ManifestError::Io { path, error } => Self::IoError { path, error },
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
