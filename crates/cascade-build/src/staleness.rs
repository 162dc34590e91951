//! Timestamp-based staleness detection
//!
//! The decision itself is a pure function over three "latest mtime" values.
//! An empty file set has no latest mtime (`None`), which orders below every
//! real timestamp and therefore forces a rebuild.
//!
//! Build outputs are represented by a marker file in the output directory
//! that is only written after a fully successful loop, so outputs left
//! behind by an aborted run never count as fresh.

use crate::error::{BuildError, BuildResult};
use crate::workspace::WorkspaceSet;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use walkdir::WalkDir;

/// File name of the last-success marker inside the output directory
pub const SUCCESS_MARKER: &str = ".cascade-ok";

/// Path of the success marker for `output_dir`
pub fn success_marker(output_dir: &Path) -> PathBuf {
    output_dir.join(SUCCESS_MARKER)
}

/// Write a fresh success marker
pub fn record_success(output_dir: &Path) -> BuildResult<()> {
    fs::create_dir_all(output_dir).map_err(|e| BuildError::io(output_dir, e))?;
    let marker = success_marker(output_dir);
    clear_success(output_dir)?;
    fs::write(&marker, "ok\n").map_err(|e| BuildError::io(&marker, e))
}

/// Remove the success marker; a missing marker is fine
pub fn clear_success(output_dir: &Path) -> BuildResult<()> {
    let marker = success_marker(output_dir);
    match fs::remove_file(&marker) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::io(&marker, e)),
    }
}

/// A directory (or single file) whose modification times are compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    /// Directory or file path
    pub path: PathBuf,
    /// Descend into subdirectories
    pub recursive: bool,
}

impl FileSet {
    /// Every file below `path`
    pub fn recursive(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: true,
        }
    }

    /// Only the files directly inside `path`
    pub fn shallow(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: false,
        }
    }

    /// Collect modification times; missing paths yield nothing
    pub fn mtimes(&self) -> Vec<SystemTime> {
        if self.path.is_file() {
            return file_mtime(&self.path).into_iter().collect();
        }
        if !self.path.is_dir() {
            return Vec::new();
        }

        let walker = if self.recursive {
            WalkDir::new(&self.path)
        } else {
            WalkDir::new(&self.path).max_depth(1)
        };

        walker
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| file_mtime(e.path()))
            .collect()
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Maximum of a set of timestamps; `None` stands for negative infinity
pub fn latest_mtime<I>(times: I) -> Option<SystemTime>
where
    I: IntoIterator<Item = SystemTime>,
{
    times.into_iter().max()
}

/// Latest modification times of sources, build outputs and expansions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessSignal {
    pub latest_source_mtime: Option<SystemTime>,
    pub latest_output_mtime: Option<SystemTime>,
    pub latest_expansion_mtime: Option<SystemTime>,
    /// Expansions must be fresh too; off when expansion is disabled
    pub expansion_required: bool,
}

impl StalenessSignal {
    /// Build a signal from raw timestamp sets
    pub fn from_mtimes<S, O, E>(sources: S, outputs: O, expansions: E) -> Self
    where
        S: IntoIterator<Item = SystemTime>,
        O: IntoIterator<Item = SystemTime>,
        E: IntoIterator<Item = SystemTime>,
    {
        Self {
            latest_source_mtime: latest_mtime(sources),
            latest_output_mtime: latest_mtime(outputs),
            latest_expansion_mtime: latest_mtime(expansions),
            expansion_required: true,
        }
    }

    /// Whether expansion outputs take part in the decision
    pub fn with_expansion_required(mut self, required: bool) -> Self {
        self.expansion_required = required;
        self
    }

    /// Skip only when outputs (and expansions, if required) are strictly
    /// newer than every source
    pub fn should_skip(&self) -> bool {
        self.latest_output_mtime > self.latest_source_mtime
            && (!self.expansion_required
                || self.latest_expansion_mtime > self.latest_source_mtime)
    }

    /// Seconds since the epoch for reporting
    pub fn summary(&self) -> StalenessSummary {
        StalenessSummary {
            latest_source_mtime: self.latest_source_mtime.and_then(epoch_secs),
            latest_output_mtime: self.latest_output_mtime.and_then(epoch_secs),
            latest_expansion_mtime: self.latest_expansion_mtime.and_then(epoch_secs),
            expansion_required: self.expansion_required,
            skip: self.should_skip(),
        }
    }
}

/// Serializable view of a [`StalenessSignal`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StalenessSummary {
    pub latest_source_mtime: Option<f64>,
    pub latest_output_mtime: Option<f64>,
    pub latest_expansion_mtime: Option<f64>,
    pub expansion_required: bool,
    pub skip: bool,
}

fn epoch_secs(time: SystemTime) -> Option<f64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs_f64())
}

/// Collects the three file sets for a workspace set
#[derive(Debug, Clone)]
pub struct StalenessDetector {
    sources: Vec<FileSet>,
    outputs: FileSet,
    expansions: FileSet,
    expansion_required: bool,
}

impl StalenessDetector {
    /// Create a detector over explicit file sets
    pub fn new(sources: Vec<FileSet>, outputs: FileSet, expansions: FileSet) -> Self {
        Self {
            sources,
            outputs,
            expansions,
            expansion_required: true,
        }
    }

    /// Ignore the expansion directory when expansion is disabled
    pub fn with_expansion_required(mut self, required: bool) -> Self {
        self.expansion_required = required;
        self
    }

    /// Sources are each workspace's source dir and manifest plus any extra
    /// paths; outputs are the success marker in `output_dir`
    pub fn for_workspaces(
        workspaces: &WorkspaceSet,
        source_dir: &Path,
        extra_sources: &[PathBuf],
        output_dir: &Path,
        expansion_dir: &Path,
    ) -> Self {
        let mut sources = Vec::new();
        for ws in workspaces.iter() {
            sources.push(FileSet::recursive(ws.root.join(source_dir)));
            sources.push(FileSet::shallow(&ws.manifest_path));
        }
        sources.extend(extra_sources.iter().cloned().map(FileSet::recursive));

        Self::new(
            sources,
            FileSet::shallow(success_marker(output_dir)),
            FileSet::recursive(expansion_dir),
        )
    }

    /// Source file sets
    pub fn sources(&self) -> &[FileSet] {
        &self.sources
    }

    /// Scan the filesystem and compute the signal
    pub fn detect(&self) -> StalenessSignal {
        let signal = StalenessSignal::from_mtimes(
            self.sources.iter().flat_map(|set| set.mtimes()),
            self.outputs.mtimes(),
            self.expansions.mtimes(),
        )
        .with_expansion_required(self.expansion_required);
        debug!(
            skip = signal.should_skip(),
            "staleness: sources={:?} outputs={:?} expansions={:?}",
            signal.latest_source_mtime,
            signal.latest_output_mtime,
            signal.latest_expansion_mtime
        );
        signal
    }
}
