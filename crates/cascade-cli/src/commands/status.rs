//! Status command - report whether a build would be skipped

use super::project::Project;
use anyhow::{Context, Result};
use colored::*;
use serde_json::json;
use std::path::PathBuf;
use std::time::SystemTime;

/// Status command arguments
#[derive(Default)]
pub struct StatusArgs {
    /// Project directory (defaults to current directory)
    pub project_dir: Option<PathBuf>,
    /// JSON output
    pub json: bool,
}

/// Run the status command
pub fn run(args: StatusArgs) -> Result<()> {
    let project = Project::load(args.project_dir.as_deref())?;
    let orchestrator = project.orchestrator(project.build_config());

    let set = orchestrator
        .discover()
        .context("Failed to discover workspaces")?;
    let signal = orchestrator.staleness(&set);

    if args.json {
        let output = json!({
            "root": project.root,
            "workspaces": set.len(),
            "up_to_date": signal.should_skip(),
            "staleness": signal.summary(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if signal.should_skip() {
        println!(
            "{} the last successful build is newer than every source",
            "Up to date:".green().bold()
        );
    } else {
        println!("{} a build would run", "Stale:".yellow().bold());
    }
    println!("  workspaces:      {}", set.len());
    println!("  latest source:   {}", describe(signal.latest_source_mtime));
    println!("  last success:    {}", describe(signal.latest_output_mtime));
    if signal.expansion_required {
        println!("  latest expanded: {}", describe(signal.latest_expansion_mtime));
    } else {
        println!("  latest expanded: {}", "not checked (expansion disabled)".dimmed());
    }

    Ok(())
}

fn describe(time: Option<SystemTime>) -> String {
    let Some(time) = time else {
        return "none".to_string();
    };
    match SystemTime::now().duration_since(time) {
        Ok(age) => format!("{}s ago", age.as_secs()),
        Err(_) => "in the future".to_string(),
    }
}
