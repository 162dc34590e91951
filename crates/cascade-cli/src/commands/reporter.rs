//! Console progress and summaries for build runs

use super::project::display_relative;
use cascade_build::{
    BuildOutcome, BuildReport, BuildStatus, ExpansionRecord, LoopObserver, LoopState, Step,
    StepStatus, Workspace,
};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Prints loop progress to stdout with a spinner per workspace
pub struct ConsoleObserver {
    root: PathBuf,
    enabled: bool,
    spinner: Option<ProgressBar>,
}

impl ConsoleObserver {
    /// Observer for `root`; a disabled one prints nothing
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            root: root.into(),
            enabled,
            spinner: None,
        }
    }

    fn start_spinner(&mut self, message: String) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.green} {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(pb);
    }

    fn stop_spinner(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

impl LoopObserver for ConsoleObserver {
    fn cycle_started(&mut self, attempt: usize) {
        if self.enabled {
            println!("{} Cycle {}", "==>".blue().bold(), attempt);
        }
    }

    fn workspace_started(&mut self, workspace: &Workspace) {
        if self.enabled {
            self.start_spinner(format!(
                "Checking {} ({})",
                workspace.package_name(),
                display_relative(&workspace.root, &self.root)
            ));
        }
    }

    fn workspace_finished(&mut self, outcome: &BuildOutcome) {
        self.stop_spinner();
        if !self.enabled {
            return;
        }

        let label = if outcome.is_passed() {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };
        println!(
            "  {} {} ({}) {}",
            label,
            outcome.package_name,
            display_relative(&outcome.workspace, &self.root),
            step_line(outcome)
        );
    }

    fn expansion_finished(&mut self, _workspace: &Workspace, records: &[ExpansionRecord]) {
        if !self.enabled || records.is_empty() {
            return;
        }
        let failed = records
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count();
        let written = records.iter().filter(|r| r.succeeded()).count();
        if failed > 0 {
            println!(
                "       expanded {}/{} ({} failed)",
                written,
                records.len(),
                failed.to_string().yellow()
            );
        } else {
            println!("       expanded {}/{}", written, records.len());
        }
    }

    fn state_changed(&mut self, state: LoopState) {
        if state.is_terminal() {
            self.stop_spinner();
        }
    }
}

/// One status mark per step, e.g. `format ✓ lint ✓ test ✗ build -`
fn step_line(outcome: &BuildOutcome) -> String {
    Step::all()
        .iter()
        .map(|step| {
            let mark = match outcome.status(*step) {
                StepStatus::Passed => "✓".green(),
                StepStatus::Failed if step.is_gating() => "✗".red(),
                StepStatus::Failed => "!".yellow(),
                StepStatus::NotRun => "-".dimmed(),
            };
            format!("{} {}", step.name(), mark)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Final human-readable summary of a build
pub fn print_summary(report: &BuildReport) {
    println!();
    println!("{}", "=".repeat(60));
    match &report.status {
        BuildStatus::UpToDate => {
            println!("{} nothing changed since the last build", "Up to date:".green().bold());
        }
        BuildStatus::Succeeded { published } => {
            println!(
                "{} {} workspace(s) in {} cycle(s), {:.2}s",
                "Build succeeded:".green().bold(),
                report.outcomes.len(),
                report.cycles,
                report.elapsed_secs
            );
            if let Some(artifact) = published {
                println!(
                    "  published {} ({} bytes)",
                    display_relative(&artifact.source, &report.root),
                    artifact.size
                );
                for dest in &artifact.destinations {
                    println!("    -> {}", display_relative(dest, &report.root));
                }
            }
        }
        BuildStatus::Aborted { failure, cancelled } => {
            let reason = if *cancelled {
                "cancelled".to_string()
            } else {
                failure
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "stopped".to_string())
            };
            println!(
                "{} {} after {} cycle(s)",
                "Build aborted:".red().bold(),
                reason,
                report.cycles
            );
        }
    }

    let stats = &report.expansion;
    if stats.jobs > 0 {
        println!(
            "  expansion: {} written, {} failed, {} skipped",
            stats.succeeded, stats.failed, stats.skipped
        );
    }
    println!("{}", "=".repeat(60));
}
