//! Workspaces command - list every workspace reachable from the root

use super::project::{display_relative, Project};
use anyhow::{Context, Result};
use colored::*;
use serde_json::json;
use std::path::PathBuf;

/// Workspaces command arguments
#[derive(Default)]
pub struct WorkspacesArgs {
    /// Project directory (defaults to current directory)
    pub project_dir: Option<PathBuf>,
    /// JSON output
    pub json: bool,
}

/// Run the workspaces command
pub fn run(args: WorkspacesArgs) -> Result<()> {
    let project = Project::load(args.project_dir.as_deref())?;
    let config = project.build_config();
    let order = config.order;
    let orchestrator = project.orchestrator(config);

    let set = orchestrator
        .discover()
        .context("Failed to discover workspaces")?;
    let ordered = set.ordered(order);

    if args.json {
        let listed: Vec<_> = ordered
            .iter()
            .map(|ws| {
                json!({
                    "name": ws.package_name(),
                    "root": ws.root,
                    "manifest": ws.manifest_path,
                    "depth": ws.depth,
                    "features": ws.manifest.feature_names,
                    "binaries": ws.manifest.binary_names,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    for ws in &ordered {
        let mut details = Vec::new();
        if ws.manifest.has_features() {
            details.push(format!("{} feature(s)", ws.manifest.feature_names.len()));
        }
        if ws.manifest.has_binaries() {
            details.push(format!("bins: {}", ws.manifest.binary_names.join(", ")));
        }
        let details = if details.is_empty() {
            String::new()
        } else {
            format!(" [{}]", details.join("; ")).dimmed().to_string()
        };
        println!(
            "{}{} {}{}",
            "  ".repeat(ws.depth),
            ws.package_name().bold(),
            display_relative(&ws.root, &project.root),
            details
        );
    }
    println!("{} workspace(s), order: {}", ordered.len(), order.name());

    Ok(())
}
