//! Workspace discovery over manifest-declared members
//!
//! Discovery is a depth-first walk starting at the root workspace. Every
//! member path is canonicalized before it is compared, so `./core` and
//! `bindings/../core` name the same workspace. A path that shows up again
//! while it is still on the traversal stack is a cycle.
use crate::error::{BuildError, BuildResult};
use cascade_manifest::{Manifest, DEFAULT_MANIFEST_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A discovered workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    /// Canonical workspace root
    pub root: PathBuf,
    /// Manifest file inside `root`
    pub manifest_path: PathBuf,
    /// Parsed manifest
    pub manifest: Manifest,
    /// Distance from the starting root
    pub depth: usize,
    /// Index of the workspace that declared this one
    pub parent: Option<usize>,
}

impl Workspace {
    /// Package name from the manifest
    pub fn package_name(&self) -> &str {
        &self.manifest.package_name
    }
}

/// Order in which the retry loop visits workspaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingOrder {
    /// Root first, then members depth-first in declaration order
    #[default]
    Discovery,
    /// Members before the workspace that declares them
    MembersFirst,
}

impl ProcessingOrder {
    /// Parse an order name
    pub fn parse(s: &str) -> BuildResult<Self> {
        match s.to_lowercase().as_str() {
            "discovery" | "root-first" => Ok(Self::Discovery),
            "members-first" | "post-order" => Ok(Self::MembersFirst),
            other => Err(BuildError::InvalidConfig(format!(
                "unknown processing order '{}', expected 'discovery' or 'members-first'",
                other
            ))),
        }
    }

    /// Get order name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::MembersFirst => "members-first",
        }
    }
}

/// Ordered, deduplicated set of workspaces reachable from a root
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkspaceSet {
    workspaces: Vec<Workspace>,
    #[serde(skip)]
    post_order: Vec<usize>,
}

impl WorkspaceSet {
    /// Number of workspaces
    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// The starting workspace
    pub fn root(&self) -> Option<&Workspace> {
        self.workspaces.first()
    }

    /// Get a workspace by discovery index
    pub fn get(&self, index: usize) -> Option<&Workspace> {
        self.workspaces.get(index)
    }

    /// Iterate in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.iter()
    }

    /// Workspace roots in discovery order
    pub fn paths(&self) -> Vec<&Path> {
        self.workspaces.iter().map(|ws| ws.root.as_path()).collect()
    }

    /// Check whether a canonical root is part of the set
    pub fn contains(&self, root: &Path) -> bool {
        self.workspaces.iter().any(|ws| ws.root == root)
    }

    /// Workspaces in the requested processing order
    pub fn ordered(&self, order: ProcessingOrder) -> Vec<&Workspace> {
        match order {
            ProcessingOrder::Discovery => self.workspaces.iter().collect(),
            ProcessingOrder::MembersFirst => self
                .post_order
                .iter()
                .map(|&index| &self.workspaces[index])
                .collect(),
        }
    }
}

/// Walks manifest members to build a [`WorkspaceSet`]
#[derive(Debug, Clone)]
pub struct WorkspaceDiscoverer {
    manifest_name: String,
}

struct Traversal {
    set: WorkspaceSet,
    index_of: HashMap<PathBuf, usize>,
    stack: Vec<PathBuf>,
}

impl WorkspaceDiscoverer {
    /// Create a discoverer looking for the default manifest name
    pub fn new() -> Self {
        Self {
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
        }
    }

    /// Set the manifest file name
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// Discover every workspace reachable from `root`
    pub fn discover(&self, root: &Path) -> BuildResult<WorkspaceSet> {
        let root = self.canonical_root(root)?;
        let mut traversal = Traversal {
            set: WorkspaceSet::default(),
            index_of: HashMap::new(),
            stack: Vec::new(),
        };

        self.visit(&root, None, 0, &mut traversal)?;

        debug!(
            "discovered {} workspace(s) from {}",
            traversal.set.len(),
            root.display()
        );
        Ok(traversal.set)
    }

    fn visit(
        &self,
        path: &Path,
        parent: Option<usize>,
        depth: usize,
        traversal: &mut Traversal,
    ) -> BuildResult<()> {
        if let Some(start) = traversal.stack.iter().position(|p| p == path) {
            let cycle = traversal.stack[start..]
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(BuildError::CyclicWorkspaceGraph(cycle));
        }

        if traversal.index_of.contains_key(path) {
            debug!("skipping already discovered workspace {}", path.display());
            return Ok(());
        }

        let manifest = Manifest::load(path, &self.manifest_name)?;
        let members = self.member_roots(path, &manifest)?;

        let index = traversal.set.workspaces.len();
        traversal.set.workspaces.push(Workspace {
            root: path.to_path_buf(),
            manifest_path: path.join(&self.manifest_name),
            manifest,
            depth,
            parent,
        });
        traversal.index_of.insert(path.to_path_buf(), index);

        traversal.stack.push(path.to_path_buf());
        for member in members {
            self.visit(&member, Some(index), depth + 1, traversal)?;
        }
        traversal.stack.pop();

        traversal.set.post_order.push(index);
        Ok(())
    }

    /// Resolve declared members of one workspace to canonical roots
    fn member_roots(&self, root: &Path, manifest: &Manifest) -> BuildResult<Vec<PathBuf>> {
        let mut roots = Vec::new();

        for member in &manifest.member_paths {
            if manifest.is_excluded(member) {
                debug!("member {} is excluded", member.display());
                continue;
            }

            if member.file_name().map_or(false, |name| name == "*") {
                let parent = member.parent().unwrap_or_else(|| Path::new(""));
                for dir in self.glob_members(root, parent)? {
                    let relative = parent.join(dir.file_name().unwrap_or_default());
                    if !manifest.is_excluded(&relative) {
                        roots.push(self.canonical_root(&dir)?);
                    }
                }
            } else {
                roots.push(self.canonical_root(&root.join(member))?);
            }
        }

        Ok(roots)
    }

    /// Subdirectories of `root/parent` that carry a manifest, sorted by name
    fn glob_members(&self, root: &Path, parent: &Path) -> BuildResult<Vec<PathBuf>> {
        let dir = root.join(parent);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BuildError::io(&dir, e)),
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && path.join(&self.manifest_name).is_file())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    fn canonical_root(&self, path: &Path) -> BuildResult<PathBuf> {
        fs::canonicalize(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BuildError::ManifestNotFound {
                    path: path.join(&self.manifest_name),
                }
            } else {
                BuildError::io(path, e)
            }
        })
    }
}

impl Default for WorkspaceDiscoverer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_workspace(root: &Path, rel: &str, name: &str, members: &[&str]) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        let mut manifest = format!("[package]\nname = \"{}\"\n", name);
        if !members.is_empty() {
            let quoted: Vec<String> = members.iter().map(|m| format!("\"{}\"", m)).collect();
            manifest.push_str(&format!("\n[workspace]\nmembers = [{}]\n", quoted.join(", ")));
        }
        fs::write(dir.join(DEFAULT_MANIFEST_NAME), manifest).unwrap();
    }

    fn names(set: &WorkspaceSet, order: ProcessingOrder) -> Vec<String> {
        set.ordered(order)
            .iter()
            .map(|ws| ws.package_name().to_string())
            .collect()
    }

    #[test]
    fn test_single_workspace() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), ".", "solo", &[]);

        let set = WorkspaceDiscoverer::new().discover(temp.path()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.root().unwrap().package_name(), "solo");
        assert_eq!(set.root().unwrap().depth, 0);
    }

    #[test]
    fn test_discovery_order_is_root_then_depth_first() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), ".", "root", &["a", "b"]);
        write_workspace(temp.path(), "a", "a", &["a1"]);
        write_workspace(temp.path(), "a/a1", "a1", &[]);
        write_workspace(temp.path(), "b", "b", &[]);

        let set = WorkspaceDiscoverer::new().discover(temp.path()).unwrap();
        assert_eq!(
            names(&set, ProcessingOrder::Discovery),
            vec!["root", "a", "a1", "b"]
        );
        assert_eq!(
            names(&set, ProcessingOrder::MembersFirst),
            vec!["a1", "a", "b", "root"]
        );
        assert_eq!(set.get(2).unwrap().parent, Some(1));
        assert_eq!(set.get(2).unwrap().depth, 2);
    }

    #[test]
    fn test_two_spellings_are_deduplicated() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), ".", "root", &["core", "./core", "b/../core"]);
        write_workspace(temp.path(), "core", "core", &[]);
        fs::create_dir_all(temp.path().join("b")).unwrap();

        let set = WorkspaceDiscoverer::new().discover(temp.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.ordered(ProcessingOrder::MembersFirst).len(), 2);
    }

    #[test]
    fn test_diamond_members_visited_once() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), ".", "root", &["a", "b"]);
        write_workspace(temp.path(), "a", "a", &["../shared"]);
        write_workspace(temp.path(), "b", "b", &["../shared"]);
        write_workspace(temp.path(), "shared", "shared", &[]);

        let set = WorkspaceDiscoverer::new().discover(temp.path()).unwrap();
        assert_eq!(
            names(&set, ProcessingOrder::Discovery),
            vec!["root", "a", "shared", "b"]
        );
    }

    #[test]
    fn test_self_member_is_a_cycle() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), ".", "root", &["."]);

        let err = WorkspaceDiscoverer::new().discover(temp.path()).unwrap_err();
        assert!(matches!(err, BuildError::CyclicWorkspaceGraph(_)));
    }

    #[test]
    fn test_transitive_cycle_names_the_path() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), ".", "root", &["a"]);
        write_workspace(temp.path(), "a", "a", &["../b"]);
        write_workspace(temp.path(), "b", "b", &["../a"]);

        let err = WorkspaceDiscoverer::new().discover(temp.path()).unwrap_err();
        match err {
            BuildError::CyclicWorkspaceGraph(cycle) => {
                assert_eq!(cycle.matches(" -> ").count(), 2);
            }
            other => panic!("Expected CyclicWorkspaceGraph, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_member_is_manifest_not_found() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), ".", "root", &["ghost"]);

        let err = WorkspaceDiscoverer::new().discover(temp.path()).unwrap_err();
        assert!(matches!(err, BuildError::ManifestNotFound { .. }));
    }

    #[test]
    fn test_member_directory_without_manifest() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), ".", "root", &["empty"]);
        fs::create_dir_all(temp.path().join("empty")).unwrap();

        let err = WorkspaceDiscoverer::new().discover(temp.path()).unwrap_err();
        assert!(matches!(err, BuildError::ManifestNotFound { .. }));
    }

    #[test]
    fn test_glob_members_and_exclude() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(DEFAULT_MANIFEST_NAME),
            "[package]\nname = \"root\"\n[workspace]\nmembers = [\"crates/*\"]\nexclude = [\"crates/skip\"]\n",
        )
        .unwrap();
        write_workspace(temp.path(), "crates/zeta", "zeta", &[]);
        write_workspace(temp.path(), "crates/alpha", "alpha", &[]);
        write_workspace(temp.path(), "crates/skip", "skip", &[]);
        fs::create_dir_all(temp.path().join("crates/not-a-crate")).unwrap();

        let set = WorkspaceDiscoverer::new().discover(temp.path()).unwrap();
        assert_eq!(
            names(&set, ProcessingOrder::Discovery),
            vec!["root", "alpha", "zeta"]
        );
    }

    #[test]
    fn test_processing_order_parse() {
        assert_eq!(
            ProcessingOrder::parse("members-first").unwrap(),
            ProcessingOrder::MembersFirst
        );
        assert_eq!(
            ProcessingOrder::parse("Discovery").unwrap(),
            ProcessingOrder::Discovery
        );
        assert!(ProcessingOrder::parse("random").is_err());
    }
}
