//! Unit tests for configuration and graceful degradation
//!
//! Tests that manipulate MSS_ROOT_FOLDER or MSS_ROOT are marked with #[serial]
//! so they never run in parallel with each other.

use mss_common::config::{
    load_toml_config, write_toml_config, CompiledDefaults, IntakeConfig, LoggingConfig,
    RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_root_env() {
    env::remove_var("MSS_ROOT_FOLDER");
    env::remove_var("MSS_ROOT");
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert_eq!(defaults.bind_addr, "127.0.0.1:5790");
}

#[test]
#[serial]
fn test_cli_arg_has_highest_priority() {
    clear_root_env();
    env::set_var("MSS_ROOT_FOLDER", "/tmp/mss-env-folder");

    let root = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/mss-cli-folder")))
        .resolve();

    assert_eq!(root, PathBuf::from("/tmp/mss-cli-folder"));
    clear_root_env();
}

#[test]
#[serial]
fn test_env_var_mss_root_folder_takes_precedence() {
    clear_root_env();
    env::set_var("MSS_ROOT_FOLDER", "/tmp/mss-priority-1");
    env::set_var("MSS_ROOT", "/tmp/mss-priority-2");

    let root = RootFolderResolver::new("test-module").resolve();

    assert_eq!(root, PathBuf::from("/tmp/mss-priority-1"));
    clear_root_env();
}

#[test]
#[serial]
fn test_env_var_mss_root_fallback() {
    clear_root_env();
    env::set_var("MSS_ROOT", "/tmp/mss-env-root");

    let root = RootFolderResolver::new("test-module").resolve();

    assert_eq!(root, PathBuf::from("/tmp/mss-env-root"));
    clear_root_env();
}

#[test]
#[serial]
fn test_toml_root_used_when_no_cli_or_env() {
    clear_root_env();
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/mss-toml-root")),
        ..TomlConfig::default()
    };

    let root = RootFolderResolver::new("test-module")
        .with_toml_config(config)
        .resolve();

    assert_eq!(root, PathBuf::from("/tmp/mss-toml-root"));
}

#[test]
#[serial]
fn test_compiled_default_used_last() {
    clear_root_env();

    let root = RootFolderResolver::new("test-module")
        .with_toml_config(TomlConfig::default())
        .resolve();

    assert_eq!(root, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
fn test_initializer_database_path() {
    let root = PathBuf::from("/tmp/mss-test-root");
    let initializer = RootFolderInitializer::new(root.clone());

    assert_eq!(initializer.database_path(), root.join("mss.db"));
}

#[test]
fn test_initializer_creates_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("root");
    let initializer = RootFolderInitializer::new(root.clone());

    assert!(!root.exists());
    initializer.ensure_directory_exists().unwrap();
    assert!(root.is_dir());
    assert!(!initializer.database_path().exists());
}

#[test]
fn test_toml_write_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/mss")),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        intake: IntakeConfig {
            bind_addr: Some("0.0.0.0:8080".to_string()),
        },
    };

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
    assert!(!path.with_extension("toml.tmp").exists());
}

#[test]
fn test_toml_missing_sections_use_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = \"/data\"\n").unwrap();

    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded.root_folder, Some(PathBuf::from("/data")));
    assert_eq!(loaded.logging.level, "info");
    assert!(loaded.intake.bind_addr.is_none());
}

#[test]
fn test_toml_parse_error_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, mss_common::Error::Config(_)));
}
