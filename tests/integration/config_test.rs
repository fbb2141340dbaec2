//! Config Integration Tests
//!
//! The config file lifecycle as the binary uses it: create with defaults,
//! override per run, persist updates, reject invalid files.

use std::path::PathBuf;

use askdb::models::settings::{EmbeddingProviderKind, SettingsUpdate};
use askdb::storage::config::ConfigService;
use askdb::AppError;

#[test]
fn test_missing_file_is_created_with_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nested").join("config.json");

    let service = ConfigService::open(&path).unwrap();
    assert!(path.exists());
    assert_eq!(service.get_config().model, "gpt-4o-mini");
    assert_eq!(service.get_config().embedding_provider, EmbeddingProviderKind::Tfidf);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["max_history"], 10);
    assert_eq!(raw["retry"]["max_attempts"], 3);
}

#[test]
fn test_update_persists_across_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.json");

    let mut service = ConfigService::open(&path).unwrap();
    service
        .update_config(SettingsUpdate {
            model: Some("gpt-4o".to_string()),
            sqlite_path: Some(PathBuf::from("plant.db")),
            turn_timeout_secs: Some(90),
            ..Default::default()
        })
        .unwrap();

    let reopened = ConfigService::open(&path).unwrap();
    let config = reopened.get_config();
    assert_eq!(config.model, "gpt-4o");
    assert_eq!(config.database.sqlite_path, Some(PathBuf::from("plant.db")));
    assert_eq!(config.turn_timeout_secs, Some(90));
}

#[test]
fn test_run_overrides_do_not_touch_the_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.json");
    let service = ConfigService::open(&path).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let mut config = service.get_config_clone();
    config.apply_update(SettingsUpdate {
        embedding_provider: Some(EmbeddingProviderKind::Openai),
        ..Default::default()
    });
    assert!(config.validate().is_ok());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn test_invalid_files_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();

    let broken = tmp.path().join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    assert!(matches!(
        ConfigService::open(&broken),
        Err(AppError::Config(_))
    ));

    let invalid = tmp.path().join("invalid.json");
    std::fs::write(&invalid, r#"{"chunk_size": 10, "chunk_overlap": 10}"#).unwrap();
    assert!(matches!(
        ConfigService::open(&invalid),
        Err(AppError::Validation(_))
    ));
}
