//! Tests for configuration file resolution and loading
//!
//! Tests that touch PEERBOOK_CONFIG are marked #[serial] so they do not race
//! on the process environment.

use peerbook_common::config::{
    load_config, load_toml_config, resolve_config_path, ConfigSource, TerminationPolicy,
    TomlConfig, CONFIG_ENV_VAR,
};
use peerbook_common::Error;
use serial_test::serial;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_full_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
        database_path = "/var/lib/peerbook/peers.db"
        port = 6000

        [logging]
        level = "debug"

        [ens]
        rpc_url = "http://localhost:8545"

        [account_directory]
        base_url = "http://localhost:9000"
        api_key = "toml-key"
        requests_per_second = 2

        [worker]
        batch_size = 250
        queue_capacity = 4096
        termination = "until_drained"
        call_timeout_ms = 1500
        account_id_attempts = 4
        max_flush_attempts = 2
        flush_retry_interval_ms = 100
        "#,
    );

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.database_path, PathBuf::from("/var/lib/peerbook/peers.db"));
    assert_eq!(config.port, 6000);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.ens.rpc_url, "http://localhost:8545");
    assert_eq!(config.account_directory.api_key.as_deref(), Some("toml-key"));
    assert_eq!(config.account_directory.requests_per_second, 2);
    assert_eq!(config.worker.batch_size, 250);
    assert_eq!(config.worker.queue_capacity, 4096);
    assert_eq!(config.worker.termination, TerminationPolicy::UntilDrained);
    assert_eq!(config.worker.account_id_attempts, 4);
    assert_eq!(config.worker.max_flush_attempts, 2);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "port = \"not a number\"");

    let result = load_toml_config(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_validation_runs_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "[worker]\nbatch_size = 0\n");

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_explicit_missing_file_fails() {
    let source = ConfigSource::Explicit(PathBuf::from("/nonexistent/peerbook.toml"));
    assert!(load_config(&source).is_err());
}

#[test]
fn test_missing_platform_default_uses_defaults() {
    let source = ConfigSource::PlatformDefault(PathBuf::from("/nonexistent/peerbook.toml"));
    let config = load_config(&source).unwrap();
    assert_eq!(config.port, TomlConfig::default().port);
}

#[test]
#[serial]
fn test_env_var_names_config_file() {
    std::env::set_var(CONFIG_ENV_VAR, "/etc/peerbook/from-env.toml");

    let source = resolve_config_path(None);

    std::env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(
        source,
        ConfigSource::Explicit(PathBuf::from("/etc/peerbook/from-env.toml"))
    );
}

#[test]
#[serial]
fn test_cli_argument_beats_env_var() {
    std::env::set_var(CONFIG_ENV_VAR, "/etc/peerbook/from-env.toml");

    let cli = PathBuf::from("/opt/peerbook/cli.toml");
    let source = resolve_config_path(Some(&cli));

    std::env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(source, ConfigSource::Explicit(cli));
}

#[test]
#[serial]
fn test_without_env_var_falls_back_to_platform_dir() {
    std::env::remove_var(CONFIG_ENV_VAR);

    match resolve_config_path(None) {
        ConfigSource::PlatformDefault(path) => {
            assert!(path.ends_with("peerbook/config.toml"));
        }
        ConfigSource::BuiltIn => {}
        other => panic!("Unexpected config source: {:?}", other),
    }
}
