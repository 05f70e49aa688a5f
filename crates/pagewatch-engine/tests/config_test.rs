use pagewatch_engine::config::{ConfigError, ConfigLoader, MonitorConfig};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_defaults() {
    let config = MonitorConfig::default();
    assert_eq!(
        config.allowed_origins,
        vec!["https://app.shipper.now/", "https://app.shipper.app"]
    );
    assert_eq!(config.debounce(), Duration::from_millis(250));
    assert_eq!(config.dedup_window(), Duration::from_secs(5));
    assert_eq!(config.initial_check_delay(), Duration::from_secs(1));
    assert_eq!(config.poll_interval(), Duration::from_millis(500));
    assert_eq!(config.poll_budget, 20);
    assert_eq!(config.max_string_length, 10_000);
    assert_eq!(config.max_depth, 5);
    assert_eq!(config.max_collection_entries, 100);
    assert_eq!(config.function_source_length, 100);
    assert_eq!(config.blank_screen_root_id, "root");
}

#[tokio::test]
async fn test_load_partial_yaml_keeps_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "allowed_origins:\n  - http://localhost:3000\ndebounce_ms: 100\npoll_budget: 4"
    )
    .unwrap();

    let config = ConfigLoader::load_from(file.path()).await.unwrap();
    assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
    assert_eq!(config.debounce_ms, 100);
    assert_eq!(config.poll_budget, 4);
    assert_eq!(config.dedup_window_ms, 5000);
    assert_eq!(
        config.framework_markers,
        vec!["data-reactroot", "data-react-helmet"]
    );
}

#[tokio::test]
async fn test_load_rejects_malformed_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "debounce_ms: [not, a, number]").unwrap();

    let result = ConfigLoader::load_from(file.path()).await;
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[tokio::test]
async fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConfigLoader::load_from(&dir.path().join("absent.yaml")).await;
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[tokio::test]
async fn test_load_rejects_invalid_origin() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "allowed_origins:\n  - \"*\"\n  - parent-window").unwrap();

    let result = ConfigLoader::load_from(file.path()).await;
    assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("parent-window")));
}

#[test]
fn test_parse_empty_document_uses_defaults() {
    let config = ConfigLoader::parse("{}").unwrap();
    assert_eq!(config, MonitorConfig::default());
}
