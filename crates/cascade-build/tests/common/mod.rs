//! Shared helpers: on-disk workspaces and a scripted toolchain
#![allow(dead_code)]

use cascade_build::{BuildError, BuildResult, CommandOutput, Invocation, Toolchain};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Write `<dir>/Cargo.toml` and `<dir>/src/lib.rs`
pub fn write_workspace(
    dir: &Path,
    name: &str,
    features: &[&str],
    bins: &[&str],
    members: &[&str],
) -> PathBuf {
    let mut toml = format!("[package]\nname = \"{}\"\nversion = \"0.1.0\"\n", name);
    if !features.is_empty() {
        toml.push_str("\n[features]\ndefault = []\n");
        for feature in features {
            toml.push_str(&format!("{} = []\n", feature));
        }
    }
    for bin in bins {
        toml.push_str(&format!("\n[[bin]]\nname = \"{}\"\n", bin));
    }
    if !members.is_empty() {
        let quoted: Vec<String> = members.iter().map(|m| format!("\"{}\"", m)).collect();
        toml.push_str(&format!("\n[workspace]\nmembers = [{}]\n", quoted.join(", ")));
    }

    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(dir.join("Cargo.toml"), toml).unwrap();
    fs::write(dir.join("src/lib.rs"), format!("//! {}\n", name)).unwrap();
    dir.to_path_buf()
}

/// Set a file's modification time
pub fn set_mtime(path: &Path, time: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

/// Push a workspace's manifest and sources an hour into the past
pub fn age_workspace(dir: &Path) {
    let past = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&dir.join("Cargo.toml"), past);
    set_mtime(&dir.join("src/lib.rs"), past);
}

struct FailRule {
    package: String,
    subcommand: String,
    /// `None` fails forever
    remaining: Option<usize>,
}

/// In-memory toolchain that records invocations and fails on request
#[derive(Default)]
pub struct ScriptedToolchain {
    calls: Mutex<Vec<Invocation>>,
    rules: Mutex<Vec<FailRule>>,
    spawn_failures: Mutex<Vec<String>>,
    artifact: Option<PathBuf>,
}

impl ScriptedToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// `subcommand` always fails in the workspace directory named `package`
    pub fn failing(self, package: &str, subcommand: &str) -> Self {
        self.push_rule(package, subcommand, None)
    }

    /// `subcommand` fails `times` times in the workspace named `package`
    pub fn failing_times(self, package: &str, subcommand: &str, times: usize) -> Self {
        self.push_rule(package, subcommand, Some(times))
    }

    /// `subcommand` cannot be started at all
    pub fn unspawnable(self, subcommand: &str) -> Self {
        self.spawn_failures.lock().unwrap().push(subcommand.to_string());
        self
    }

    /// `build` creates this file
    pub fn producing(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    fn push_rule(self, package: &str, subcommand: &str, remaining: Option<usize>) -> Self {
        self.rules.lock().unwrap().push(FailRule {
            package: package.to_string(),
            subcommand: subcommand.to_string(),
            remaining,
        });
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// `(workspace dir name, subcommand)` for every call
    pub fn trace(&self) -> Vec<(String, String)> {
        self.calls()
            .iter()
            .map(|inv| {
                (
                    dir_name(&inv.working_dir),
                    inv.subcommand().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    /// Workspace dir names that ran `subcommand`, in call order
    pub fn workspaces_for(&self, subcommand: &str) -> Vec<String> {
        self.trace()
            .into_iter()
            .filter(|(_, sub)| sub == subcommand)
            .map(|(ws, _)| ws)
            .collect()
    }

    fn should_fail(&self, package: &str, subcommand: &str) -> bool {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if rule.package != package || rule.subcommand != subcommand {
                continue;
            }
            match rule.remaining.as_mut() {
                None => return true,
                Some(0) => continue,
                Some(n) => {
                    *n -= 1;
                    return true;
                }
            }
        }
        false
    }
}

impl Toolchain for ScriptedToolchain {
    fn invoke(&self, invocation: &Invocation) -> BuildResult<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let subcommand = invocation.subcommand().unwrap_or_default().to_string();
        let package = dir_name(&invocation.working_dir);

        if self.spawn_failures.lock().unwrap().contains(&subcommand) {
            return Err(BuildError::spawn(invocation.to_string(), "program not found"));
        }
        if self.should_fail(&package, &subcommand) {
            return Ok(CommandOutput::failure(
                101,
                format!("error: {} failed in {}", subcommand, package),
            ));
        }

        match subcommand.as_str() {
            "expand" => Ok(CommandOutput::success(format!(
                "// expanded: {}\n",
                invocation.args.join(" ")
            ))),
            "build" => {
                if let Some(artifact) = &self.artifact {
                    fs::create_dir_all(artifact.parent().unwrap()).unwrap();
                    fs::write(artifact, b"artifact").unwrap();
                }
                Ok(CommandOutput::success(Vec::new()))
            }
            _ => Ok(CommandOutput::success(Vec::new())),
        }
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sorted file names in a directory
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
