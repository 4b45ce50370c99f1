use mim_scheduler::cli::{ConfigDiscovery, LogFileMode, SchedulerConfig};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::{NamedTempFile, TempDir};

const FULL_CONFIG: &str = r#"
what_if = true

[logging]
level = "warning"
file_mode = "per_execution"
directory = "D:\\Logs\\Scheduler"
file_enabled = false

[executors]
powershell = "C:\\Windows\\System32\\WindowsPowerShell\\v1.0\\powershell.exe"
cscript = "cscript.exe"
sqlcmd = "sqlcmd.exe"
sql_command_timeout_secs = 120
process_timeout_secs = 3600
"#;

#[test]
fn test_full_config_parses() {
    let config: SchedulerConfig =
        toml::from_str(FULL_CONFIG).expect("Should be able to parse a full configuration");

    assert!(config.what_if);
    assert_eq!(config.logging.level, "warning");
    assert_eq!(config.logging.file_mode, LogFileMode::PerExecution);
    assert!(!config.logging.file_enabled);
    assert_eq!(config.executors.cscript, "cscript.exe");
    assert_eq!(config.executors.sql_command_timeout_secs, 120);
    assert_eq!(
        config.executors.process_timeout().map(|d| d.as_secs()),
        Some(3600)
    );
}

#[test]
fn test_config_file_roundtrip() {
    let original: SchedulerConfig = toml::from_str(FULL_CONFIG).unwrap();

    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    let temp_path = temp_file.path();

    original
        .to_toml_file(temp_path)
        .expect("Should be able to save config to file");
    let loaded =
        SchedulerConfig::from_toml_file(temp_path).expect("Should be able to load config from file");

    assert_eq!(original, loaded);
}

#[test]
fn test_unknown_file_mode_is_rejected() {
    let result = toml::from_str::<SchedulerConfig>("[logging]\nfile_mode = \"hourly\"");
    assert!(result.is_err(), "Unknown file modes should not parse");
}

#[test]
#[serial]
fn test_discovery_prefers_local_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let previous_dir = env::current_dir().unwrap();

    fs::write(temp_dir.path().join("mim-scheduler.toml"), "what_if = true").unwrap();
    fs::create_dir(temp_dir.path().join(".mim-scheduler")).unwrap();
    fs::write(
        temp_dir.path().join(".mim-scheduler").join("config.toml"),
        "what_if = false",
    )
    .unwrap();

    env::set_current_dir(temp_dir.path()).unwrap();
    let discovered = ConfigDiscovery::discover_config();
    env::set_current_dir(previous_dir).unwrap();

    let (config, source) = discovered.expect("Local configuration should load");
    assert!(config.what_if);
    assert_eq!(
        source.and_then(|p| p.file_name().map(|n| n.to_os_string())),
        Some("mim-scheduler.toml".into())
    );
}

#[test]
#[serial]
fn test_discovery_falls_back_to_app_directory() {
    let temp_dir = TempDir::new().unwrap();
    let previous_dir = env::current_dir().unwrap();

    fs::create_dir(temp_dir.path().join(".mim-scheduler")).unwrap();
    fs::write(
        temp_dir.path().join(".mim-scheduler").join("config.toml"),
        "[logging]\nlevel = \"debug\"",
    )
    .unwrap();

    env::set_current_dir(temp_dir.path()).unwrap();
    let discovered = ConfigDiscovery::discover_config();
    env::set_current_dir(previous_dir).unwrap();

    let (config, source) = discovered.expect("App directory configuration should load");
    assert_eq!(config.logging.level, "debug");
    assert!(source.is_some_and(|p| p.ends_with(".mim-scheduler/config.toml")));
}
