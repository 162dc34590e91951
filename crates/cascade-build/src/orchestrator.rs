//! Build pipeline: discovery, staleness check, retry loop, publishing
use crate::cancel::CancellationToken;
use crate::config::BuildConfig;
use crate::controller::{
    CycleFailure, DecisionPolicy, LoopObserver, LoopResult, RetryLoopController,
};
use crate::error::{BuildError, BuildResult};
use crate::expand::{ExpansionRecord, ExpansionRunner, ExpansionStats};
use crate::features::ExpansionJob;
use crate::publish::{ArtifactPublisher, PublishedArtifact};
use crate::staleness::{
    clear_success, record_success, StalenessDetector, StalenessSignal, StalenessSummary,
};
use crate::steps::BuildOutcome;
use crate::toolchain::{ProcessToolchain, Toolchain};
use crate::workspace::{WorkspaceDiscoverer, WorkspaceSet};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// How a build ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum BuildStatus {
    /// Outputs are newer than every source; nothing ran
    UpToDate,
    /// Every workspace passed
    Succeeded {
        /// `None` when no artifact is configured
        published: Option<PublishedArtifact>,
    },
    /// The policy or operator stopped the loop
    Aborted {
        /// Last failing workspace and step
        failure: Option<CycleFailure>,
        cancelled: bool,
    },
}

/// Summary of one `build` run
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Canonical root workspace
    pub root: PathBuf,
    /// Workspaces in processing order
    pub workspaces: Vec<PathBuf>,
    #[serde(flatten)]
    pub status: BuildStatus,
    /// `None` when the check was skipped with `force`
    pub staleness: Option<StalenessSummary>,
    /// Number of cycles run
    pub cycles: usize,
    /// Step outcomes of the last cycle
    pub outcomes: Vec<BuildOutcome>,
    /// Expansion counts over every cycle
    pub expansion: ExpansionStats,
    /// Wall time in seconds
    pub elapsed_secs: f64,
}

impl BuildReport {
    /// Succeeded or already up to date
    pub fn is_success(&self) -> bool {
        !matches!(self.status, BuildStatus::Aborted { .. })
    }

    /// Error describing an aborted build
    pub fn abort_error(&self) -> Option<BuildError> {
        match &self.status {
            BuildStatus::Aborted { cancelled: true, .. } => Some(BuildError::Cancelled),
            BuildStatus::Aborted {
                failure: Some(failure),
                ..
            } => Some(failure.clone().into_error()),
            BuildStatus::Aborted { failure: None, .. } => Some(BuildError::Cancelled),
            _ => None,
        }
    }

    /// Pretty JSON for `--json` output
    pub fn to_json_pretty(&self) -> BuildResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Ties discovery, staleness, the retry loop and publishing together
pub struct Orchestrator {
    root: PathBuf,
    config: BuildConfig,
    toolchain: Box<dyn Toolchain>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator that runs real toolchain processes
    pub fn new(root: impl Into<PathBuf>, config: BuildConfig) -> Self {
        Self {
            root: root.into(),
            config,
            toolchain: Box::new(ProcessToolchain::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the toolchain
    pub fn with_toolchain(mut self, toolchain: impl Toolchain + 'static) -> Self {
        self.toolchain = Box::new(toolchain);
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Starting directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build configuration
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Validate the configuration and discover every workspace
    pub fn discover(&self) -> BuildResult<WorkspaceSet> {
        self.config.validate()?;
        WorkspaceDiscoverer::new()
            .with_manifest_name(&self.config.manifest_name)
            .discover(&self.root)
    }

    /// Staleness detector over the discovered workspaces
    pub fn staleness_detector(&self, set: &WorkspaceSet) -> StalenessDetector {
        let root = workspace_root(set, &self.root);
        let layout = &self.config.layout;
        StalenessDetector::for_workspaces(
            set,
            &layout.source_dir,
            &layout.extra_sources_in(&root),
            &layout.output_dir_in(&root),
            &layout.expansion_dir_in(&root),
        )
        .with_expansion_required(self.config.expansion.enabled)
    }

    /// Current staleness signal
    pub fn staleness(&self, set: &WorkspaceSet) -> StalenessSignal {
        self.staleness_detector(set).detect()
    }

    /// Every expansion job in processing order
    pub fn plan_expansion(&self, set: &WorkspaceSet) -> BuildResult<Vec<ExpansionJob>> {
        let matrix = self.config.expansion.matrix();
        let mut jobs = Vec::new();
        for workspace in set.ordered(self.config.order) {
            jobs.extend(matrix.expand(workspace)?);
        }
        Ok(jobs)
    }

    /// Run expansion alone, without steps or staleness check
    pub fn expand_only(&self, set: &WorkspaceSet) -> BuildResult<Vec<ExpansionRecord>> {
        let jobs = self.plan_expansion(set)?;
        let root = workspace_root(set, &self.root);
        let expansion = &self.config.expansion;

        let runner = ExpansionRunner::new(
            self.toolchain.as_ref(),
            &self.config.commands,
            self.config.layout.expansion_dir_in(&root),
        )
        .with_extension(expansion.extension.clone())
        .with_parallel(expansion.parallel)
        .with_cancellation(&self.cancel);

        Ok(runner.run(&jobs))
    }

    /// Full pipeline
    pub fn build(
        &self,
        force: bool,
        policy: &mut dyn DecisionPolicy,
        observer: &mut dyn LoopObserver,
    ) -> BuildResult<BuildReport> {
        let start = Instant::now();
        let set = self.discover()?;
        let root = workspace_root(&set, &self.root);
        let workspaces = set
            .ordered(self.config.order)
            .into_iter()
            .map(|ws| ws.root.clone())
            .collect();

        let staleness = if force {
            None
        } else {
            let signal = self.staleness(&set);
            if signal.should_skip() {
                info!("outputs are newer than every source; nothing to do");
                return Ok(BuildReport {
                    root,
                    workspaces,
                    status: BuildStatus::UpToDate,
                    staleness: Some(signal.summary()),
                    cycles: 0,
                    outcomes: Vec::new(),
                    expansion: ExpansionStats::default(),
                    elapsed_secs: start.elapsed().as_secs_f64(),
                });
            }
            Some(signal.summary())
        };

        // A run that does not reach `Succeeded` must leave the tree stale
        clear_success(&self.config.layout.output_dir_in(&root))?;

        let expansion_dir = self.config.layout.expansion_dir_in(&root);
        let controller = RetryLoopController::new(self.toolchain.as_ref(), &self.config.commands)
            .with_expansion(&self.config.expansion, expansion_dir)
            .with_order(self.config.order)
            .with_cancellation(&self.cancel);

        let result = controller.run(&set, policy, observer)?;
        let status = self.finish(&root, &result)?;

        Ok(BuildReport {
            root,
            workspaces,
            status,
            staleness,
            cycles: result.attempts(),
            outcomes: result.final_outcomes().to_vec(),
            expansion: result.expansion_stats(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    fn finish(&self, root: &Path, result: &LoopResult) -> BuildResult<BuildStatus> {
        if !result.succeeded() {
            return Ok(BuildStatus::Aborted {
                failure: result.last_failure().cloned(),
                cancelled: result.cancelled,
            });
        }

        let published = match &self.config.artifact {
            Some(spec) => Some(ArtifactPublisher::new(root, spec.clone()).publish()?),
            None => None,
        };
        record_success(&self.config.layout.output_dir_in(root))?;
        Ok(BuildStatus::Succeeded { published })
    }
}

fn workspace_root(set: &WorkspaceSet, fallback: &Path) -> PathBuf {
    set.root()
        .map(|ws| ws.root.clone())
        .unwrap_or_else(|| fallback.to_path_buf())
}
