//! Directory overrides. Each integration test binary is its own process, so
//! the overrides below win over the platform defaults.

use serial_test::serial;

#[test]
#[serial]
fn overridden_directories_are_created_and_resolved() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = root.path().join("config");
    let data = root.path().join("data");
    let logs = root.path().join("logs");

    termspace_paths::set_config_dir(config.clone());
    termspace_paths::set_data_dir(data.clone());
    termspace_paths::set_logs_dir(logs.clone());

    assert!(!data.exists());
    let resolved = termspace_paths::resolve_config_directory().expect("resolve");
    assert_eq!(resolved, data);
    assert!(data.is_dir());
    assert_eq!(termspace_paths::snapshot_file(), data.join("workspaces.json.gz"));

    termspace_paths::ensure_dirs().expect("ensure dirs");
    assert!(config.is_dir());
    assert!(logs.is_dir());
    assert_eq!(termspace_paths::config_file(), config.join("config.toml"));
}
