//! Tests for loading, saving and validating configuration

use handoff_config::{init_at, Config, ConfigError};
use tempfile::TempDir;

fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[tokio::test]
async fn test_load_missing_file_uses_defaults() {
    let dir = temp_dir();
    let config = Config::load_from(&dir.path().join("absent.json"))
        .await
        .unwrap();

    assert_eq!(config.gate.max_iterations, 5);
    assert_eq!(
        config.gate.description,
        "Output handler. ONLY RETURN THE FINAL RESULT USING THIS TOOL!"
    );
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = temp_dir();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.agent.name = "researcher".to_string();
    config.agent.prompt_prefix = Some("You research things.".to_string());
    config.gate.max_iterations = 3;
    config.engine.model = "replay".to_string();
    config.engine.verbose = true;

    config.save_to(&path).await.unwrap();
    assert!(path.exists());

    let loaded = Config::load_from(&path).await.unwrap();
    assert_eq!(loaded.agent.name, "researcher");
    assert_eq!(
        loaded.agent.prompt_prefix.as_deref(),
        Some("You research things.")
    );
    assert_eq!(loaded.gate.max_iterations, 3);
    assert_eq!(loaded.engine.model, "replay");
    assert!(loaded.engine.verbose);
}

#[tokio::test]
async fn test_load_invalid_json() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, "{not json").await.unwrap();

    let result = Config::load_from(&path).await;
    assert!(matches!(result, Err(ConfigError::Json(_))));
}

#[tokio::test]
async fn test_load_rejects_zero_engine_iterations() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, r#"{"engine": {"max_iterations": 0}}"#)
        .await
        .unwrap();

    match Config::load_from(&path).await {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("engine.max_iterations")),
        other => panic!("Expected Invalid, got {:?}", other),
    }
}

#[tokio::test]
async fn test_init_at_keeps_existing_file() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, r#"{"gate": {"max_iterations": 9}}"#)
        .await
        .unwrap();

    let config = init_at(&path).await.unwrap();
    assert_eq!(config.gate.max_iterations, 9);
}

#[tokio::test]
async fn test_init_at_writes_defaults() {
    let dir = temp_dir();
    let path = dir.path().join("fresh").join("config.json");

    let config = init_at(&path).await.unwrap();
    assert!(path.exists());
    assert_eq!(config.agent.name, "agent");
}

#[test]
fn test_error_display() {
    let err = ConfigError::Invalid("bad".to_string());
    assert_eq!(err.to_string(), "◆ INVALID CONFIG: bad");

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: ConfigError = io_err.into();
    assert!(err.to_string().contains("DATA LINK ERROR"));
}

#[test]
fn test_config_path_under_data_dir() {
    let path = handoff_config::config_path();
    assert!(path.starts_with(handoff_config::data_dir()));
    assert!(path.ends_with("config.json"));
}
