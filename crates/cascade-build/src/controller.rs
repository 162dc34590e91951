//! Retry loop controller
//!
//! One cycle visits every workspace in processing order: steps first, then
//! that workspace's expansion jobs. A gating failure ends the cycle and moves
//! the loop to `AwaitingOperatorDecision`. Continuing restarts from the first
//! workspace; there is no partial resume.

use crate::cancel::CancellationToken;
use crate::config::ExpansionConfig;
use crate::error::{BuildError, BuildResult};
use crate::expand::{ExpansionRecord, ExpansionRunner, ExpansionStats};
use crate::features::ExpansionJob;
use crate::steps::{BuildOutcome, Step, StepRunner};
use crate::toolchain::{CommandSet, Toolchain};
use crate::workspace::{ProcessingOrder, Workspace, WorkspaceSet};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopState {
    Running,
    AwaitingOperatorDecision,
    Succeeded,
    Aborted,
}

impl LoopState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Aborted)
    }
}

/// What to do after a failed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorDecision {
    /// Run the whole cycle again
    Continue,
    /// Stop without publishing
    Abort,
}

/// The gating failure that ended a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleFailure {
    /// 1-based cycle number
    pub attempt: usize,
    pub workspace: PathBuf,
    pub package_name: String,
    pub step: Step,
    pub command: String,
    pub exit_code: Option<i32>,
    /// Captured output of the failing command
    pub output: String,
}

impl CycleFailure {
    fn from_outcome(attempt: usize, outcome: &BuildOutcome) -> Option<Self> {
        let failure = outcome.failure.as_ref()?;
        Some(Self {
            attempt,
            workspace: outcome.workspace.clone(),
            package_name: outcome.package_name.clone(),
            step: failure.step,
            command: failure.command.clone(),
            exit_code: failure.exit_code,
            output: failure.output.clone(),
        })
    }

    /// Convert into the error reported when the loop is aborted
    pub fn into_error(self) -> BuildError {
        BuildError::ExternalCommandFailed {
            command: self.command,
            exit_code: self.exit_code,
            output: self.output,
        }
    }
}

impl std::fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed for {} ({})",
            self.step,
            self.package_name,
            self.workspace.display()
        )
    }
}

/// Decides between retrying and aborting after a failed cycle
pub trait DecisionPolicy {
    fn decide(&mut self, failure: &CycleFailure) -> OperatorDecision;
}

/// Non-interactive policies for automated runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Abort on the first failed cycle
    FailFast,
    /// Allow up to N cycles in total
    MaxAttempts(usize),
}

impl DecisionPolicy for RetryPolicy {
    fn decide(&mut self, failure: &CycleFailure) -> OperatorDecision {
        match self {
            Self::FailFast => OperatorDecision::Abort,
            Self::MaxAttempts(max) if failure.attempt < *max => OperatorDecision::Continue,
            Self::MaxAttempts(_) => OperatorDecision::Abort,
        }
    }
}

impl<F> DecisionPolicy for F
where
    F: FnMut(&CycleFailure) -> OperatorDecision,
{
    fn decide(&mut self, failure: &CycleFailure) -> OperatorDecision {
        self(failure)
    }
}

/// Progress callbacks; every method defaults to doing nothing
pub trait LoopObserver {
    fn cycle_started(&mut self, _attempt: usize) {}
    fn workspace_started(&mut self, _workspace: &Workspace) {}
    fn workspace_finished(&mut self, _outcome: &BuildOutcome) {}
    fn expansion_finished(&mut self, _workspace: &Workspace, _records: &[ExpansionRecord]) {}
    fn state_changed(&mut self, _state: LoopState) {}
}

/// Observer that ignores every event
#[derive(Debug, Default)]
pub struct NoopObserver;

impl LoopObserver for NoopObserver {}

/// Everything that happened in one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub attempt: usize,
    /// Outcomes of the workspaces attempted, in processing order
    pub outcomes: Vec<BuildOutcome>,
    pub expansions: Vec<ExpansionRecord>,
    pub failure: Option<CycleFailure>,
}

impl CycleReport {
    /// Every workspace was attempted and passed
    pub fn is_passed(&self) -> bool {
        self.failure.is_none() && self.outcomes.iter().all(BuildOutcome::is_passed)
    }
}

/// Terminal result of the loop
#[derive(Debug, Clone, Serialize)]
pub struct LoopResult {
    /// `Succeeded` or `Aborted`
    pub state: LoopState,
    pub cycles: Vec<CycleReport>,
    /// Set when the loop stopped on a cancellation request
    pub cancelled: bool,
}

impl LoopResult {
    /// Check if the loop succeeded
    pub fn succeeded(&self) -> bool {
        self.state == LoopState::Succeeded
    }

    /// Number of cycles run
    pub fn attempts(&self) -> usize {
        self.cycles.len()
    }

    /// The failure of the last cycle, if it failed
    pub fn last_failure(&self) -> Option<&CycleFailure> {
        self.cycles.last().and_then(|cycle| cycle.failure.as_ref())
    }

    /// Outcomes of the last cycle
    pub fn final_outcomes(&self) -> &[BuildOutcome] {
        self.cycles
            .last()
            .map(|cycle| cycle.outcomes.as_slice())
            .unwrap_or(&[])
    }

    /// Expansion counts over every cycle
    pub fn expansion_stats(&self) -> ExpansionStats {
        let mut stats = ExpansionStats::default();
        for cycle in &self.cycles {
            stats.merge(ExpansionStats::from_records(&cycle.expansions));
        }
        stats
    }
}

/// Drives step and expansion runners until success or abort
pub struct RetryLoopController<'a> {
    toolchain: &'a dyn Toolchain,
    commands: &'a CommandSet,
    expansion: Option<(&'a ExpansionConfig, PathBuf)>,
    order: ProcessingOrder,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> RetryLoopController<'a> {
    /// Create a controller with expansion disabled
    pub fn new(toolchain: &'a dyn Toolchain, commands: &'a CommandSet) -> Self {
        Self {
            toolchain,
            commands,
            expansion: None,
            order: ProcessingOrder::default(),
            cancel: None,
        }
    }

    /// Expand every workspace into `output_dir` after its steps
    pub fn with_expansion(
        mut self,
        config: &'a ExpansionConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        self.expansion = config.enabled.then(|| (config, output_dir.into()));
        self
    }

    /// Set processing order
    pub fn with_order(mut self, order: ProcessingOrder) -> Self {
        self.order = order;
        self
    }

    /// Stop between invocations once this token is cancelled
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Expansion jobs for every workspace in processing order. Fails before
    /// anything runs when a feature matrix is too large.
    pub fn plan<'s>(
        &self,
        set: &'s WorkspaceSet,
    ) -> BuildResult<Vec<(&'s Workspace, Vec<ExpansionJob>)>> {
        let matrix = self.expansion.as_ref().map(|(config, _)| config.matrix());

        set.ordered(self.order)
            .into_iter()
            .map(|workspace| {
                let jobs = match &matrix {
                    Some(matrix) => matrix.expand(workspace)?,
                    None => Vec::new(),
                };
                Ok((workspace, jobs))
            })
            .collect()
    }

    /// Run cycles until every workspace passes or the policy aborts
    pub fn run(
        &self,
        set: &WorkspaceSet,
        policy: &mut dyn DecisionPolicy,
        observer: &mut dyn LoopObserver,
    ) -> BuildResult<LoopResult> {
        let plan = self.plan(set)?;
        let mut cycles = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            observer.state_changed(LoopState::Running);
            observer.cycle_started(attempt);
            info!("cycle {} over {} workspace(s)", attempt, plan.len());

            let cycle = match self.run_cycle(attempt, &plan, observer) {
                Ok(cycle) => cycle,
                Err(BuildError::Cancelled) => return Ok(self.cancelled(cycles, observer)),
                Err(e) => return Err(e),
            };

            if cycle.is_passed() {
                cycles.push(cycle);
                observer.state_changed(LoopState::Succeeded);
                return Ok(LoopResult {
                    state: LoopState::Succeeded,
                    cycles,
                    cancelled: false,
                });
            }

            let decision = match &cycle.failure {
                Some(failure) => {
                    observer.state_changed(LoopState::AwaitingOperatorDecision);
                    warn!("cycle {}: {}", attempt, failure);
                    policy.decide(failure)
                }
                None => OperatorDecision::Abort,
            };
            cycles.push(cycle);

            if self.is_cancelled() {
                return Ok(self.cancelled(cycles, observer));
            }

            match decision {
                OperatorDecision::Continue => info!("retrying from the first workspace"),
                OperatorDecision::Abort => {
                    observer.state_changed(LoopState::Aborted);
                    return Ok(LoopResult {
                        state: LoopState::Aborted,
                        cycles,
                        cancelled: false,
                    });
                }
            }
        }
    }

    fn run_cycle(
        &self,
        attempt: usize,
        plan: &[(&Workspace, Vec<ExpansionJob>)],
        observer: &mut dyn LoopObserver,
    ) -> BuildResult<CycleReport> {
        let mut steps = StepRunner::new(self.toolchain, self.commands);
        if let Some(token) = self.cancel {
            steps = steps.with_cancellation(token);
        }

        let mut report = CycleReport {
            attempt,
            outcomes: Vec::with_capacity(plan.len()),
            expansions: Vec::new(),
            failure: None,
        };

        for (workspace, jobs) in plan {
            observer.workspace_started(workspace);
            let outcome = steps.run(workspace)?;
            observer.workspace_finished(&outcome);

            if !jobs.is_empty() {
                let records = self.expand(jobs);
                observer.expansion_finished(workspace, &records);
                report.expansions.extend(records);
            }

            report.failure = CycleFailure::from_outcome(attempt, &outcome);
            report.outcomes.push(outcome);
            if report.failure.is_some() {
                break;
            }
        }

        Ok(report)
    }

    fn expand(&self, jobs: &[ExpansionJob]) -> Vec<ExpansionRecord> {
        let Some((config, output_dir)) = &self.expansion else {
            return Vec::new();
        };

        let mut runner = ExpansionRunner::new(self.toolchain, self.commands, output_dir.clone())
            .with_extension(config.extension.clone())
            .with_parallel(config.parallel);
        if let Some(token) = self.cancel {
            runner = runner.with_cancellation(token);
        }
        runner.run(jobs)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.map_or(false, |token| token.is_cancelled())
    }

    fn cancelled(&self, cycles: Vec<CycleReport>, observer: &mut dyn LoopObserver) -> LoopResult {
        warn!("build cancelled");
        observer.state_changed(LoopState::Aborted);
        LoopResult {
            state: LoopState::Aborted,
            cycles,
            cancelled: true,
        }
    }
}
