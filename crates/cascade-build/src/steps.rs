//! Per-workspace format/lint/test/build steps

use crate::cancel::CancellationToken;
use crate::error::{BuildError, BuildResult};
use crate::toolchain::{CommandOutput, CommandSet, Toolchain};
use crate::workspace::Workspace;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// A toolchain step run for every workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Format,
    Lint,
    Test,
    Build,
}

impl Step {
    /// All steps in execution order
    pub fn all() -> [Step; 4] {
        [Self::Format, Self::Lint, Self::Test, Self::Build]
    }

    /// Get step name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Lint => "lint",
            Self::Test => "test",
            Self::Build => "build",
        }
    }

    /// Whether a failure stops the remaining steps of the workspace
    pub fn is_gating(&self) -> bool {
        !matches!(self, Self::Format)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    #[default]
    NotRun,
    Passed,
    Failed,
}

/// The gating step that stopped a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: Step,
    /// Command line that failed
    pub command: String,
    /// `None` when the program could not be started or was killed
    pub exit_code: Option<i32>,
    /// Captured stdout and stderr
    pub output: String,
}

/// Per-workspace step record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub workspace: PathBuf,
    pub package_name: String,
    pub format: StepStatus,
    pub lint: StepStatus,
    pub test: StepStatus,
    pub build: StepStatus,
    pub failure: Option<StepFailure>,
}

impl BuildOutcome {
    /// Create an outcome with every step not run
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            workspace: workspace.root.clone(),
            package_name: workspace.package_name().to_string(),
            format: StepStatus::NotRun,
            lint: StepStatus::NotRun,
            test: StepStatus::NotRun,
            build: StepStatus::NotRun,
            failure: None,
        }
    }

    /// Status of a step
    pub fn status(&self, step: Step) -> StepStatus {
        match step {
            Step::Format => self.format,
            Step::Lint => self.lint,
            Step::Test => self.test,
            Step::Build => self.build,
        }
    }

    fn set(&mut self, step: Step, status: StepStatus) {
        match step {
            Step::Format => self.format = status,
            Step::Lint => self.lint = status,
            Step::Test => self.test = status,
            Step::Build => self.build = status,
        }
    }

    /// Every gating step passed
    pub fn is_passed(&self) -> bool {
        Step::all()
            .iter()
            .filter(|step| step.is_gating())
            .all(|step| self.status(*step) == StepStatus::Passed)
    }

    /// The first failing gating step, if any
    pub fn failed_step(&self) -> Option<Step> {
        self.failure.as_ref().map(|f| f.step)
    }
}

/// Runs the step sequence for one workspace
pub struct StepRunner<'a> {
    toolchain: &'a dyn Toolchain,
    commands: &'a CommandSet,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> StepRunner<'a> {
    /// Create a step runner
    pub fn new(toolchain: &'a dyn Toolchain, commands: &'a CommandSet) -> Self {
        Self {
            toolchain,
            commands,
            cancel: None,
        }
    }

    /// Check this token before every invocation
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run format, lint, test and build until a gating step fails
    pub fn run(&self, workspace: &Workspace) -> BuildResult<BuildOutcome> {
        let mut outcome = BuildOutcome::new(workspace);

        for step in Step::all() {
            if self.cancel.map_or(false, |token| token.is_cancelled()) {
                return Err(BuildError::Cancelled);
            }

            let invocation = self.commands.step_invocation(step, workspace);
            info!("{} {}", step, workspace.package_name());

            let output = match self.toolchain.invoke(&invocation) {
                Ok(output) => output,
                Err(BuildError::CommandSpawn { error, .. }) => CommandOutput {
                    exit_code: None,
                    stderr: error.into_bytes(),
                    ..Default::default()
                },
                Err(e) => return Err(e),
            };

            if output.succeeded() {
                outcome.set(step, StepStatus::Passed);
                continue;
            }

            outcome.set(step, StepStatus::Failed);
            if !step.is_gating() {
                warn!(
                    "{} failed for {} (not gating): {}",
                    step,
                    workspace.package_name(),
                    invocation
                );
                continue;
            }

            warn!("{} failed for {}", step, workspace.package_name());
            outcome.failure = Some(StepFailure {
                step,
                command: invocation.to_string(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
            break;
        }

        Ok(outcome)
    }
}
