//! Expand command - write macro-expanded sources for every feature subset

use super::project::{display_relative, Project};
use anyhow::{Context, Result};
use cascade_build::{ExpansionRecord, ExpansionStats, StepStatus};
use colored::*;
use serde_json::json;
use std::path::PathBuf;

/// Expand command arguments
#[derive(Default)]
pub struct ExpandArgs {
    /// Project directory (defaults to current directory)
    pub project_dir: Option<PathBuf>,
    /// List the planned jobs without invoking the toolchain
    pub dry_run: bool,
    /// JSON output
    pub json: bool,
}

/// Run the expand command
pub fn run(args: ExpandArgs) -> Result<()> {
    let project = Project::load(args.project_dir.as_deref())?;
    let config = project.build_config();
    let extension = config.expansion.extension.clone();
    let output_dir = config.layout.expansion_dir_in(&project.root);
    let orchestrator = project.orchestrator(config);

    let set = orchestrator
        .discover()
        .context("Failed to discover workspaces")?;

    if args.dry_run {
        let jobs = orchestrator.plan_expansion(&set)?;
        if args.json {
            let planned: Vec<_> = jobs
                .iter()
                .map(|job| {
                    json!({
                        "package": job.package_name,
                        "target": job.target,
                        "features": job.features,
                        "output": output_dir.join(job.output_file_name(&extension)),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&planned)?);
        } else {
            for job in &jobs {
                println!(
                    "{} {} [{}] -> {}",
                    job.package_name.bold(),
                    job.target,
                    job.features.join(","),
                    display_relative(
                        &output_dir.join(job.output_file_name(&extension)),
                        &project.root
                    )
                );
            }
            println!("{} expansion job(s) planned", jobs.len());
        }
        return Ok(());
    }

    let records = orchestrator.expand_only(&set)?;
    let stats = ExpansionStats::from_records(&records);

    if args.json {
        let output = json!({
            "stats": stats,
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for record in &records {
            print_record(record, &project.root);
        }
        println!(
            "{} {} written, {} failed, {} skipped",
            "Expansion:".bold(),
            stats.succeeded,
            stats.failed,
            stats.skipped
        );
    }

    Ok(())
}

fn print_record(record: &ExpansionRecord, root: &std::path::Path) {
    let label = match record.status {
        StepStatus::Passed => "OK".green().bold(),
        StepStatus::Failed => "FAIL".yellow().bold(),
        StepStatus::NotRun => "SKIP".dimmed(),
    };
    println!(
        "  {} {} -> {}",
        label,
        record.job.package_name,
        display_relative(&record.output_path, root)
    );
}
