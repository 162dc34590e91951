//! Build command - run the retry loop over every workspace and publish

use super::project::{automatic_policy, Project};
use super::prompt::InteractivePolicy;
use super::reporter::{print_summary, ConsoleObserver};
use anyhow::{bail, Context, Result};
use cascade_build::{
    BuildStatus, CancellationToken, DecisionPolicy, LoopObserver, NoopObserver, ProcessingOrder,
};
use cascade_config::RetryPolicyKind;
use std::path::PathBuf;
use tracing::debug;

/// Build command arguments
#[derive(Default)]
pub struct BuildArgs {
    /// Project directory (defaults to current directory)
    pub project_dir: Option<PathBuf>,
    /// Ignore the staleness check
    pub force: bool,
    /// Retry policy override
    pub policy: Option<String>,
    /// Attempt limit override for `max-attempts`
    pub max_attempts: Option<usize>,
    /// Skip feature expansion
    pub no_expand: bool,
    /// Processing order override
    pub order: Option<String>,
    /// Quiet output (errors only)
    pub quiet: bool,
    /// JSON output
    pub json: bool,
}

/// Run the build command
pub fn run(args: BuildArgs) -> Result<()> {
    let project = Project::load(args.project_dir.as_deref())?;
    let mut config = project.build_config();

    if let Some(order) = &args.order {
        config.order = ProcessingOrder::parse(order)?;
    }
    if args.no_expand {
        config = config.with_expansion(false);
    }

    let policy_kind = match &args.policy {
        Some(policy) => RetryPolicyKind::parse("--policy", policy)?,
        None => project.config.retry_policy(),
    };
    let max_attempts = args
        .max_attempts
        .unwrap_or_else(|| project.config.max_attempts());
    if max_attempts == 0 {
        bail!("--max-attempts must be at least 1");
    }
    debug!(
        "building {} with policy {} ({} attempts), order {}",
        project.root.display(),
        policy_kind.name(),
        max_attempts,
        config.order.name()
    );

    let cancel = CancellationToken::new();
    let orchestrator = project
        .orchestrator(config)
        .with_cancellation(cancel.clone());

    let mut policy: Box<dyn DecisionPolicy> = match automatic_policy(policy_kind, max_attempts) {
        Some(policy) => Box::new(policy),
        None => Box::new(InteractivePolicy::new(cancel)),
    };
    let mut observer: Box<dyn LoopObserver> = if args.json || args.quiet {
        Box::new(NoopObserver)
    } else {
        Box::new(ConsoleObserver::new(&project.root, true))
    };

    let report = orchestrator
        .build(args.force, policy.as_mut(), observer.as_mut())
        .context("Build failed")?;

    if args.json {
        println!("{}", report.to_json_pretty()?);
    } else if !args.quiet {
        print_summary(&report);
    }

    if let Some(error) = report.abort_error() {
        let summary = match &report.status {
            BuildStatus::Aborted {
                failure: Some(failure),
                cancelled: false,
            } => format!("Build aborted: {}", failure),
            _ => "Build aborted".to_string(),
        };
        return Err(anyhow::Error::new(error).context(summary));
    }

    Ok(())
}
