//! External toolchain invocation
//!
//! The toolchain is opaque: cascade only hands it an argument list and a
//! working directory and looks at the exit status and captured output.

use crate::error::{BuildError, BuildResult};
use crate::features::{ExpansionJob, ExpansionTarget};
use crate::steps::Step;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// A single external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Create a new invocation
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Check whether an argument is present
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// The first argument, usually the toolchain subcommand
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of an invocation
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Raw stdout
    pub stdout: Vec<u8>,
    /// Raw stderr
    pub stderr: Vec<u8>,
    /// Wall time
    pub duration: Duration,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failure(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Check if the command succeeded
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout and stderr as one lossy string
    pub fn combined(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str(&String::from_utf8_lossy(&self.stdout));
        }
        if !self.stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        output
    }
}

/// Something that can run toolchain invocations
pub trait Toolchain: Send + Sync {
    /// Run to completion and capture output. Only failing to start the
    /// program is an error; a non-zero exit is a normal [`CommandOutput`].
    fn invoke(&self, invocation: &Invocation) -> BuildResult<CommandOutput>;
}

/// Runs invocations as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessToolchain {
    env: Vec<(String, String)>,
}

impl ProcessToolchain {
    /// Create a process toolchain
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable for every child
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl Toolchain for ProcessToolchain {
    fn invoke(&self, invocation: &Invocation) -> BuildResult<CommandOutput> {
        debug!(
            "running `{}` in {}",
            invocation,
            invocation.working_dir.display()
        );
        let start = Instant::now();

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuildError::spawn(invocation.to_string(), e))?
            .wait_with_output()
            .map_err(|e| BuildError::spawn(invocation.to_string(), e))?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            duration: start.elapsed(),
        })
    }
}

/// Argument lists for each toolchain step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSet {
    /// Toolchain program
    pub program: String,
    /// Flag that precedes the manifest path; `None` to omit it
    pub manifest_flag: Option<String>,
    pub format: Vec<String>,
    pub lint: Vec<String>,
    pub test: Vec<String>,
    pub build: Vec<String>,
    pub expand: Vec<String>,
    /// Pass `--no-default-features --features=...` to feature-gated expansions
    pub no_default_features: bool,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            manifest_flag: Some("--manifest-path".to_string()),
            format: vec!["fmt".to_string()],
            lint: vec!["clippy".to_string()],
            test: vec!["test".to_string()],
            build: vec!["build".to_string()],
            expand: vec!["expand".to_string()],
            no_default_features: true,
        }
    }
}

impl CommandSet {
    /// Arguments configured for a step
    pub fn step_args(&self, step: Step) -> &[String] {
        match step {
            Step::Format => &self.format,
            Step::Lint => &self.lint,
            Step::Test => &self.test,
            Step::Build => &self.build,
        }
    }

    /// Check that every command has at least a subcommand
    pub fn validate(&self) -> BuildResult<()> {
        if self.program.trim().is_empty() {
            return Err(BuildError::InvalidConfig(
                "toolchain program cannot be empty".to_string(),
            ));
        }
        for step in Step::all() {
            if self.step_args(step).is_empty() {
                return Err(BuildError::InvalidConfig(format!(
                    "no command configured for the {} step",
                    step
                )));
            }
        }
        if self.expand.is_empty() {
            return Err(BuildError::InvalidConfig(
                "no command configured for expansion".to_string(),
            ));
        }
        Ok(())
    }

    /// Invocation for a format/lint/test/build step
    pub fn step_invocation(&self, step: Step, workspace: &Workspace) -> Invocation {
        self.with_manifest(
            self.step_args(step),
            workspace.manifest_path.to_string_lossy(),
            &workspace.root,
        )
    }

    /// Invocation for one expansion job
    pub fn expand_invocation(&self, job: &ExpansionJob) -> Invocation {
        let mut invocation = self.with_manifest(
            &self.expand,
            job.manifest_path.to_string_lossy(),
            &job.workspace,
        );

        match &job.target {
            ExpansionTarget::Library => invocation.args.push("--lib".to_string()),
            ExpansionTarget::Binary(name) => {
                invocation.args.push("--bin".to_string());
                invocation.args.push(name.clone());
            }
        }

        if job.feature_gated && self.no_default_features {
            invocation.args.push("--no-default-features".to_string());
            if !job.features.is_empty() {
                invocation.args.push(format!("--features={}", job.features_arg()));
            }
        }

        invocation
    }

    /// Manifest flag goes right after the subcommand so trailing `-- ...`
    /// pass-through arguments stay last
    fn with_manifest(
        &self,
        args: &[String],
        manifest_path: std::borrow::Cow<'_, str>,
        working_dir: &std::path::Path,
    ) -> Invocation {
        let mut full = Vec::with_capacity(args.len() + 2);
        let mut rest = args.iter();
        if let Some(first) = rest.next() {
            full.push(first.clone());
        }
        if let Some(flag) = self.manifest_flag.as_deref().filter(|f| !f.is_empty()) {
            full.push(flag.to_string());
            full.push(manifest_path.into_owned());
        }
        full.extend(rest.cloned());

        Invocation::new(&self.program, working_dir).args(full)
    }
}
