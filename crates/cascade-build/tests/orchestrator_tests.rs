//! End-to-end pipeline tests: discovery, staleness, loop, publishing

mod common;

use cascade_build::{
    success_marker, ArtifactSpec, BuildConfig, BuildError, BuildStatus, NoopObserver,
    Orchestrator, ProcessingOrder, RetryPolicy, Step,
};
use common::{age_workspace, file_names, set_mtime, write_workspace, ScriptedToolchain};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn artifact_config(name: &str) -> BuildConfig {
    BuildConfig::default().with_artifact(
        ArtifactSpec::new(format!("target/debug/lib{}.so", name)).with_destination("consumer/"),
    )
}

fn orchestrator(root: &Path, config: BuildConfig, toolchain: ScriptedToolchain) -> Orchestrator {
    Orchestrator::new(root, config).with_toolchain(toolchain)
}

#[test]
fn test_single_workspace_succeeds_and_publishes() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("solo"), "solo", &[], &[], &[]);
    let toolchain = ScriptedToolchain::new().producing(root.join("target/debug/libsolo.so"));

    let report = orchestrator(&root, artifact_config("solo"), toolchain)
        .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.cycles, 1);
    assert_eq!(file_names(&root.join("expanded")), vec!["solo.rs"]);

    match &report.status {
        BuildStatus::Succeeded {
            published: Some(published),
        } => {
            let canonical = root.canonicalize().unwrap();
            assert_eq!(
                published.destinations,
                vec![canonical.join("consumer/libsolo.so")]
            );
        }
        other => panic!("Expected a published artifact, got {:?}", other),
    }
    assert!(root.join("consumer/libsolo.so").is_file());
}

#[test]
fn test_feature_subsets_produce_distinct_expansion_files() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("solo"), "solo", &["y", "x"], &[], &[]);

    let report = orchestrator(&root, BuildConfig::default(), ScriptedToolchain::new())
        .build(true, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();

    assert_eq!(report.expansion.jobs, 4);
    assert_eq!(report.expansion.succeeded, 4);
    assert_eq!(
        file_names(&root.join("expanded")),
        vec![
            "solo.rs",
            "solo_features_x,y.rs",
            "solo_features_x.rs",
            "solo_features_y.rs",
        ]
    );

    let both = std::fs::read_to_string(root.join("expanded/solo_features_x,y.rs")).unwrap();
    assert!(both.contains("--no-default-features"));
    assert!(both.contains("--features=x,y"));
}

#[test]
fn test_inner_lint_failure_aborts_without_publishing() {
    let temp = TempDir::new().unwrap();
    let outer = write_workspace(&temp.path().join("outer"), "outer", &[], &[], &["inner"]);
    write_workspace(&outer.join("inner"), "inner", &[], &[], &[]);
    let toolchain = ScriptedToolchain::new()
        .failing("inner", "clippy")
        .producing(outer.join("target/debug/libouter.so"));
    let config = artifact_config("outer").with_order(ProcessingOrder::MembersFirst);

    let report = orchestrator(&outer, config, toolchain)
        .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();

    assert!(!report.is_success());
    match &report.status {
        BuildStatus::Aborted {
            failure: Some(failure),
            cancelled: false,
        } => {
            assert_eq!(failure.package_name, "inner");
            assert_eq!(failure.step, Step::Lint);
        }
        other => panic!("Expected an aborted build, got {:?}", other),
    }
    assert_eq!(report.outcomes.len(), 1);
    assert!(!outer.join("consumer").exists());
    assert!(matches!(
        report.abort_error(),
        Some(BuildError::ExternalCommandFailed { .. })
    ));
}

#[test]
fn test_up_to_date_build_is_skipped_until_a_source_changes() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("solo"), "solo", &[], &[], &[]);
    age_workspace(&root);
    let artifact = root.join("target/debug/libsolo.so");

    let first = orchestrator(
        &root,
        artifact_config("solo"),
        ScriptedToolchain::new().producing(&artifact),
    )
    .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
    .unwrap();
    assert!(matches!(first.status, BuildStatus::Succeeded { .. }));

    let second = orchestrator(&root, artifact_config("solo"), ScriptedToolchain::new())
        .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();
    assert!(matches!(second.status, BuildStatus::UpToDate));
    assert_eq!(second.cycles, 0);
    assert!(second.staleness.unwrap().skip);

    set_mtime(
        &root.join("src/lib.rs"),
        SystemTime::now() + Duration::from_secs(3600),
    );
    let toolchain = ScriptedToolchain::new().producing(&artifact);
    let third = orchestrator(&root, artifact_config("solo"), toolchain)
        .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();
    assert!(matches!(third.status, BuildStatus::Succeeded { .. }));
    assert_eq!(third.cycles, 1);
}

#[test]
fn test_aborted_build_is_not_up_to_date_on_the_next_run() {
    let temp = TempDir::new().unwrap();
    let outer = write_workspace(&temp.path().join("outer"), "outer", &[], &[], &["inner"]);
    let inner = write_workspace(&outer.join("inner"), "inner", &[], &[], &[]);
    age_workspace(&outer);
    age_workspace(&inner);

    for _ in 0..2 {
        let toolchain = ScriptedToolchain::new()
            .failing("inner", "test")
            .producing(outer.join("target/debug/libouter.so"));
        let report = orchestrator(&outer, BuildConfig::default(), toolchain)
            .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
            .unwrap();

        match &report.status {
            BuildStatus::Aborted {
                failure: Some(failure),
                ..
            } => {
                assert_eq!(failure.package_name, "inner");
                assert_eq!(failure.step, Step::Test);
            }
            other => panic!("Expected an aborted build, got {:?}", other),
        }
        assert_eq!(report.cycles, 1);
        assert!(!report.staleness.unwrap().skip);
    }

    // Outer built and expansions were written, but nothing marks a success
    assert!(outer.join("target/debug/libouter.so").is_file());
    assert!(outer.join("expanded/inner.rs").is_file());
    assert!(!success_marker(&outer.join("target/debug")).exists());
}

#[test]
fn test_failed_forced_run_invalidates_earlier_success() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("solo"), "solo", &[], &[], &[]);
    age_workspace(&root);

    orchestrator(&root, BuildConfig::default(), ScriptedToolchain::new())
        .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();
    assert!(success_marker(&root.join("target/debug")).is_file());

    let failing = ScriptedToolchain::new().failing("solo", "build");
    let forced = orchestrator(&root, BuildConfig::default(), failing)
        .build(true, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();
    assert!(!forced.is_success());

    let next = orchestrator(&root, BuildConfig::default(), ScriptedToolchain::new())
        .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();
    assert!(matches!(next.status, BuildStatus::Succeeded { .. }));
    assert_eq!(next.cycles, 1);
}

#[test]
fn test_disabled_expansion_can_still_be_up_to_date() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("solo"), "solo", &["x"], &[], &[]);
    age_workspace(&root);
    let config = || BuildConfig::default().with_expansion(false);

    let first = orchestrator(&root, config(), ScriptedToolchain::new())
        .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();
    assert!(matches!(first.status, BuildStatus::Succeeded { published: None }));
    assert!(!root.join("expanded").exists());

    let toolchain = ScriptedToolchain::new();
    let orchestrator = orchestrator(&root, config(), toolchain);
    let second = orchestrator
        .build(false, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();
    assert!(matches!(second.status, BuildStatus::UpToDate));
    assert_eq!(second.cycles, 0);

    let summary = second.staleness.unwrap();
    assert!(summary.skip);
    assert!(!summary.expansion_required);
    assert_eq!(summary.latest_expansion_mtime, None);
}

#[test]
fn test_force_ignores_staleness() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("solo"), "solo", &[], &[], &[]);
    age_workspace(&root);
    std::fs::create_dir_all(root.join("target/debug")).unwrap();
    std::fs::write(root.join("target/debug/libsolo.so"), b"old").unwrap();
    std::fs::create_dir_all(root.join("expanded")).unwrap();
    std::fs::write(root.join("expanded/solo.rs"), b"old").unwrap();

    let report = orchestrator(&root, BuildConfig::default(), ScriptedToolchain::new())
        .build(true, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();

    assert_eq!(report.cycles, 1);
    assert!(report.staleness.is_none());
    let expanded = std::fs::read_to_string(root.join("expanded/solo.rs")).unwrap();
    assert!(expanded.starts_with("// expanded:"));
}

#[test]
fn test_missing_artifact_after_success_is_an_error() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("solo"), "solo", &[], &[], &[]);

    let err = orchestrator(&root, artifact_config("solo"), ScriptedToolchain::new())
        .build(true, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap_err();

    match err {
        BuildError::ArtifactMissing { path } => assert!(path.ends_with("target/debug/libsolo.so")),
        other => panic!("Expected ArtifactMissing, got {:?}", other),
    }
}

#[test]
fn test_cyclic_members_fail_before_anything_runs() {
    let temp = TempDir::new().unwrap();
    let a = write_workspace(&temp.path().join("a"), "a", &[], &[], &["../b"]);
    write_workspace(&temp.path().join("b"), "b", &[], &[], &["../a"]);
    let toolchain = ScriptedToolchain::new();

    let orchestrator = orchestrator(&a, BuildConfig::default(), toolchain);
    let err = orchestrator
        .build(true, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap_err();

    assert!(matches!(err, BuildError::CyclicWorkspaceGraph(_)));
    assert!(!a.join("expanded").exists());
}

#[test]
fn test_missing_root_manifest() {
    let temp = TempDir::new().unwrap();
    let err = Orchestrator::new(temp.path(), BuildConfig::default())
        .discover()
        .unwrap_err();
    assert!(matches!(err, BuildError::ManifestNotFound { .. }));
}

#[test]
fn test_expand_only_skips_steps() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("app"), "app", &["fast"], &["cli"], &[]);
    let orchestrator = orchestrator(&root, BuildConfig::default(), ScriptedToolchain::new());

    let set = orchestrator.discover().unwrap();
    let planned = orchestrator.plan_expansion(&set).unwrap();
    assert_eq!(planned.len(), 2);

    let records = orchestrator.expand_only(&set).unwrap();
    assert!(records.iter().all(|r| r.succeeded()));
    assert_eq!(
        file_names(&root.join("expanded")),
        vec!["app_bin_cli.rs", "app_features_fast_bin_cli.rs"]
    );
}

#[test]
fn test_report_serializes_status() {
    let temp = TempDir::new().unwrap();
    let root = write_workspace(&temp.path().join("solo"), "solo", &[], &[], &[]);

    let report = orchestrator(&root, BuildConfig::default(), ScriptedToolchain::new())
        .build(true, &mut RetryPolicy::FailFast, &mut NoopObserver)
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["cycles"], 1);
    assert_eq!(json["outcomes"][0]["build"], "passed");
    assert_eq!(
        PathBuf::from(json["root"].as_str().unwrap()),
        root.canonicalize().unwrap()
    );
}
