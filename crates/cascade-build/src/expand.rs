//! Expansion runner
//!
//! Expansion output is a diagnostic aid. A failing job still leaves a file
//! behind (empty or partial) and is logged, but never fails the build.

use crate::cancel::CancellationToken;
use crate::features::ExpansionJob;
use crate::steps::StepStatus;
use crate::toolchain::{CommandSet, Toolchain};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of one expansion job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpansionRecord {
    pub job: ExpansionJob,
    /// File the captured stdout was written to
    pub output_path: PathBuf,
    /// `NotRun` when cancelled before the job started
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub bytes_written: usize,
}

impl ExpansionRecord {
    /// Check if the job succeeded
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

/// Runs expansion jobs and persists their output
pub struct ExpansionRunner<'a> {
    toolchain: &'a dyn Toolchain,
    commands: &'a CommandSet,
    output_dir: PathBuf,
    extension: String,
    parallel: bool,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> ExpansionRunner<'a> {
    /// Create a runner writing into `output_dir`
    pub fn new(
        toolchain: &'a dyn Toolchain,
        commands: &'a CommandSet,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            toolchain,
            commands,
            output_dir: output_dir.into(),
            extension: "rs".to_string(),
            parallel: false,
            cancel: None,
        }
    }

    /// Set the output file extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Run independent jobs on the rayon pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Skip jobs that have not started once this token is cancelled
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Output path for a job
    pub fn output_path(&self, job: &ExpansionJob) -> PathBuf {
        self.output_dir.join(job.output_file_name(&self.extension))
    }

    /// Run every job; records come back in job order
    pub fn run(&self, jobs: &[ExpansionJob]) -> Vec<ExpansionRecord> {
        if let Err(e) = fs::create_dir_all(&self.output_dir) {
            warn!(
                "cannot create expansion directory {}: {}",
                self.output_dir.display(),
                e
            );
        }

        if self.parallel {
            jobs.par_iter().map(|job| self.run_job(job)).collect()
        } else {
            jobs.iter().map(|job| self.run_job(job)).collect()
        }
    }

    fn run_job(&self, job: &ExpansionJob) -> ExpansionRecord {
        let output_path = self.output_path(job);
        let mut record = ExpansionRecord {
            job: job.clone(),
            output_path: output_path.clone(),
            status: StepStatus::NotRun,
            exit_code: None,
            bytes_written: 0,
        };

        if self.cancel.map_or(false, |token| token.is_cancelled()) {
            return record;
        }

        let invocation = self.commands.expand_invocation(job);
        debug!("expanding {} ({}) -> {}", job.package_name, job.target, output_path.display());

        let output = match self.toolchain.invoke(&invocation) {
            Ok(output) => output,
            Err(e) => {
                warn!("expansion `{}` could not run: {}", invocation, e);
                write_output(&output_path, &[]);
                record.status = StepStatus::Failed;
                return record;
            }
        };

        record.exit_code = output.exit_code;
        let written = write_output(&output_path, &output.stdout);
        record.bytes_written = if written { output.stdout.len() } else { 0 };

        if output.succeeded() && written {
            record.status = StepStatus::Passed;
        } else {
            record.status = StepStatus::Failed;
            warn!(
                "expansion of {} ({}, features [{}]) failed: {}",
                job.package_name,
                job.target,
                job.features_arg(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        record
    }
}

/// Overwrite `path` with `contents`, logging instead of failing
fn write_output(path: &Path, contents: &[u8]) -> bool {
    match fs::write(path, contents) {
        Ok(()) => true,
        Err(e) => {
            warn!("cannot write expansion output {}: {}", path.display(), e);
            false
        }
    }
}

/// Counts over a batch of expansion records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionStats {
    pub jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExpansionStats {
    /// Tally records
    pub fn from_records(records: &[ExpansionRecord]) -> Self {
        let mut stats = Self {
            jobs: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.status {
                StepStatus::Passed => stats.succeeded += 1,
                StepStatus::Failed => stats.failed += 1,
                StepStatus::NotRun => stats.skipped += 1,
            }
        }
        stats
    }

    /// Add another batch
    pub fn merge(&mut self, other: ExpansionStats) {
        self.jobs += other.jobs;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}
