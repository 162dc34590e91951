//! Configuration loading and precedence tests

use cascade_config::{
    ConfigError, ConfigLoader, GlobalConfig, ProjectConfig, RetryPolicyKind, WorkspaceOrder,
    PROJECT_CONFIG_FILE,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join(PROJECT_CONFIG_FILE);
    fs::write(&config_path, content).unwrap();
    config_path
}

fn create_global_file(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("global.toml");
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_with_empty_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    let config = ConfigLoader::new()
        .with_global_config_path(temp_dir.path().join("missing.toml"))
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(config.is_project());
    assert_eq!(config.program(), "cargo");
}

#[test]
#[serial]
fn test_load_from_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[build]\norder = \"members-first\"\n");

    let config = ConfigLoader::new()
        .with_global_config_path(temp_dir.path().join("missing.toml"))
        .load_from_file(&path)
        .unwrap();

    assert_eq!(config.order(), WorkspaceOrder::MembersFirst);
    assert_eq!(config.project_root(), Some(temp_dir.path()));
}

#[test]
#[serial]
fn test_load_from_deep_subdirectory() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[layout]\nexpansion_dir = \"out/expanded\"\n");
    let deep = temp_dir.path().join("a/b/c");
    fs::create_dir_all(&deep).unwrap();

    let config = ConfigLoader::new()
        .with_global_config_path(temp_dir.path().join("missing.toml"))
        .load_from_directory(&deep)
        .unwrap();

    assert_eq!(config.expansion_dir(), PathBuf::from("out/expanded"));
    assert_eq!(config.project_root(), Some(temp_dir.path()));
}

#[test]
fn test_missing_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .with_global_config_path(temp_dir.path().join("missing.toml"))
        .load_from_file(&temp_dir.path().join(PROJECT_CONFIG_FILE))
        .unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_global_defaults_apply_without_project_values() {
    let temp_dir = TempDir::new().unwrap();
    let global = create_global_file(
        temp_dir.path(),
        "[defaults]\ntoolchain = \"cross\"\npolicy = \"max-attempts\"\nmax_attempts = 4\n",
    );
    create_config_file(temp_dir.path(), "");

    let config = ConfigLoader::new()
        .with_global_config_path(global)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.program(), "cross");
    assert_eq!(config.retry_policy(), RetryPolicyKind::MaxAttempts);
    assert_eq!(config.max_attempts(), 4);
}

#[test]
#[serial]
fn test_project_overrides_global() {
    let temp_dir = TempDir::new().unwrap();
    let global = create_global_file(
        temp_dir.path(),
        "[defaults]\ntoolchain = \"cross\"\npolicy = \"max-attempts\"\n",
    );
    create_config_file(
        temp_dir.path(),
        "[toolchain]\nprogram = \"cargo\"\n\n[retry]\npolicy = \"fail-fast\"\n",
    );

    let config = ConfigLoader::new()
        .with_global_config_path(global)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.program(), "cargo");
    assert_eq!(config.retry_policy(), RetryPolicyKind::FailFast);
}

#[test]
#[serial]
fn test_env_overrides_project_and_global() {
    let temp_dir = TempDir::new().unwrap();
    let global = create_global_file(temp_dir.path(), "[defaults]\ntoolchain = \"cross\"\n");
    create_config_file(temp_dir.path(), "[toolchain]\nprogram = \"cargo\"\n");

    env::set_var("CASCADE_TOOLCHAIN", "/opt/fake-cargo");
    let config = ConfigLoader::new()
        .with_global_config_path(global)
        .load_from_directory(temp_dir.path());
    env::remove_var("CASCADE_TOOLCHAIN");

    assert_eq!(config.unwrap().program(), "/opt/fake-cargo");
}

#[rstest]
#[case("interactive", RetryPolicyKind::Interactive)]
#[case("fail-fast", RetryPolicyKind::FailFast)]
#[case("MAX-ATTEMPTS", RetryPolicyKind::MaxAttempts)]
#[serial]
fn test_env_policy_values(#[case] value: &str, #[case] expected: RetryPolicyKind) {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("CASCADE_POLICY", value);
    let config = ConfigLoader::new()
        .with_global_config_path(temp_dir.path().join("missing.toml"))
        .load_from_directory(temp_dir.path());
    env::remove_var("CASCADE_POLICY");

    assert_eq!(config.unwrap().retry_policy(), expected);
}

#[test]
#[serial]
fn test_empty_env_value_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[retry]\nmax_attempts = 5\n");

    env::set_var("CASCADE_MAX_ATTEMPTS", "");
    let config = ConfigLoader::new()
        .with_global_config_path(temp_dir.path().join("missing.toml"))
        .load_from_directory(temp_dir.path());
    env::remove_var("CASCADE_MAX_ATTEMPTS");

    assert_eq!(config.unwrap().max_attempts(), 5);
}

// ============================================================================
// Validation Tests
// ============================================================================

#[rstest]
#[case::unknown_section("[compiler]\noptimize = true\n")]
#[case::unknown_key("[layout]\ntarget = \"x\"\n")]
#[case::bad_policy("[retry]\npolicy = \"sometimes\"\n")]
#[case::bad_order("[build]\norder = \"random\"\n")]
#[case::artifact_without_source("[artifact]\ndestinations = [\"x\"]\n")]
fn test_rejected_by_parser(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), content);

    let err = ProjectConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::TomlParseError { .. }));
    assert!(err.to_string().contains(PROJECT_CONFIG_FILE));
}

#[rstest]
#[case::empty_program("[toolchain]\nprogram = \"\"\n")]
#[case::nested_manifest_name("[toolchain]\nmanifest_name = \"sub/Cargo.toml\"\n")]
#[case::empty_step("[steps]\nlint = []\n")]
#[case::dotted_extension("[expansion]\nextension = \".rs\"\n")]
#[case::zero_attempts("[retry]\nmax_attempts = 0\n")]
#[case::empty_artifact("[artifact]\nsource = \"\"\n")]
#[case::artifact_without_destinations("[artifact]\nsource = \"target/debug/libx.so\"\n")]
fn test_rejected_by_validation(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), content);

    let err = ProjectConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn test_invalid_global_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_global_file(temp_dir.path(), "[defaults]\nmax_attempts = 0\n");
    assert!(GlobalConfig::load_from_file(&path).is_err());
}

#[test]
fn test_round_trip_preserves_sections() {
    let content = r#"
[steps]
test = ["test", "--workspace"]

[artifact]
source = "target/debug/libbridge.so"
destinations = ["consumer/"]
"#;
    let config: ProjectConfig = toml::from_str(content).unwrap();
    let serialized = toml::to_string(&config).unwrap();
    let reparsed: ProjectConfig = toml::from_str(&serialized).unwrap();
    assert_eq!(config, reparsed);
}
