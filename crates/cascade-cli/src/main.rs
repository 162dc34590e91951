use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

mod commands;
mod config;

/// Incremental build orchestrator for nested workspaces.
///
/// Cascade discovers every workspace reachable from the root manifest, skips
/// the run when nothing changed, then formats, lints, tests and builds each
/// workspace in a retry loop. Macro-expanded sources are written for every
/// feature combination, and the final artifact is copied where consumers
/// expect it.
///
/// EXAMPLES:
///     cascade build                  Build when sources changed
///     cascade build --force          Build even when up to date
///     cascade -C core build          Build the project in ./core
///     cascade expand --dry-run       List expansion jobs
///     cascade workspaces             Show the workspace tree
///
/// ENVIRONMENT VARIABLES:
///     CASCADE_TOOLCHAIN     Toolchain program (default: cargo)
///     CASCADE_POLICY        interactive, fail-fast or max-attempts
///     CASCADE_MAX_ATTEMPTS  Attempt limit for max-attempts
///     CASCADE_OUTPUT_DIR    Toolchain output directory
///     CASCADE_JSON          Set to '1' for JSON output by default
///     NO_COLOR              Set to disable colored output
///     RUST_LOG              Log filter (e.g. cascade=debug)
#[derive(Parser)]
#[command(name = "cascade")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Run as if started in DIR
    #[arg(short = 'C', long = "dir", global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every workspace in a retry loop
    ///
    /// Runs format, lint, test and build for each workspace, expands
    /// macros for every feature subset, and publishes the artifact once a
    /// whole cycle passes. Skips everything when outputs are newer than
    /// every source.
    ///
    /// EXAMPLES:
    ///     cascade build                          Build if stale
    ///     cascade build --force                  Ignore staleness
    ///     cascade build --policy fail-fast       Abort on first failure
    ///     cascade build --policy max-attempts --max-attempts 5
    ///     cascade build --order members-first    Members before parents
    #[command(visible_alias = "b")]
    Build {
        /// Build even when outputs are up to date
        #[arg(long, short = 'f')]
        force: bool,
        /// What to do after a failed cycle
        #[arg(long, value_parser = ["interactive", "fail-fast", "max-attempts"])]
        policy: Option<String>,
        /// Cycle limit for the max-attempts policy
        #[arg(long, value_name = "N")]
        max_attempts: Option<usize>,
        /// Skip feature expansion
        #[arg(long)]
        no_expand: bool,
        /// Workspace processing order
        #[arg(long, value_parser = ["discovery", "members-first"])]
        order: Option<String>,
        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
        /// Verbose output (debug logging)
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Quiet output (errors only)
        #[arg(long, short = 'q')]
        quiet: bool,
        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Write macro-expanded sources without building
    ///
    /// EXAMPLES:
    ///     cascade expand                 Expand every workspace
    ///     cascade expand --dry-run       Show planned jobs only
    #[command(visible_alias = "e")]
    Expand {
        /// List jobs without invoking the toolchain
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List discovered workspaces
    #[command(visible_alias = "ws")]
    Workspaces {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show whether a build would be skipped
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     cascade completions bash > ~/.local/share/bash-completion/completions/cascade
    ///     cascade completions zsh > ~/.zfunc/_cascade
    ///     cascade completions fish > ~/.config/fish/completions/cascade.fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Log to stderr so stdout stays clean for reports
fn init_tracing(verbose: bool, quiet: bool) {
    let default_filter = if verbose {
        "cascade=debug,cascade_build=debug,cascade_config=debug"
    } else if quiet {
        "cascade=error,cascade_build=error"
    } else {
        "cascade=warn,cascade_build=warn"
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cli_config = config::Config::from_env();

    let (verbose, quiet) = match &cli.command {
        Commands::Build { verbose, quiet, .. } => (*verbose, *quiet),
        _ => (false, false),
    };
    init_tracing(verbose, quiet);

    let no_color = match &cli.command {
        Commands::Build { no_color, .. } => *no_color,
        _ => false,
    };
    if no_color || cli_config.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Build {
            force,
            policy,
            max_attempts,
            no_expand,
            order,
            json,
            quiet,
            ..
        } => {
            // Command-line flag overrides environment variable
            let use_json = json || cli_config.default_json;
            let args = commands::build::BuildArgs {
                project_dir: cli.dir,
                force,
                policy,
                max_attempts,
                no_expand,
                order,
                quiet,
                json: use_json,
            };
            commands::build::run(args)?;
        }
        Commands::Expand { dry_run, json } => {
            let args = commands::expand::ExpandArgs {
                project_dir: cli.dir,
                dry_run,
                json: json || cli_config.default_json,
            };
            commands::expand::run(args)?;
        }
        Commands::Workspaces { json } => {
            let args = commands::workspaces::WorkspacesArgs {
                project_dir: cli.dir,
                json: json || cli_config.default_json,
            };
            commands::workspaces::run(args)?;
        }
        Commands::Status { json } => {
            let args = commands::status::StatusArgs {
                project_dir: cli.dir,
                json: json || cli_config.default_json,
            };
            commands::status::run(args)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }

    Ok(())
}
