//! Settings Models
//!
//! Application configuration and settings data structures.

use std::path::PathBuf;
use std::time::Duration;

use askdb_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Which embedding provider backs the reference-text index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local TF-IDF vectors, no network access
    #[default]
    Tfidf,
    /// OpenAI `/embeddings` endpoint
    Openai,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(Self::Tfidf),
            "openai" => Ok(Self::Openai),
            other => Err(format!(
                "Invalid embedding provider: {}. Must be 'tfidf' or 'openai'",
                other
            )),
        }
    }
}

/// Retry settings for model calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_multiplier,
        )
    }
}

/// Database selection that is not a secret.
///
/// PostgreSQL credentials come from the environment only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Use a local SQLite file instead of PostgreSQL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chat model used for every call
    pub model: String,
    /// Number of most recent turns sent with each request
    pub max_history: usize,
    /// Static reference text appended to the system prompt
    pub reference_file: PathBuf,
    /// Where the reference-text index is persisted
    pub vector_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks retrieved per query
    pub top_k: usize,
    /// Sample rows of the first table shown to the model
    pub sample_rows: usize,
    pub embedding_provider: EmbeddingProviderKind,
    pub retry: RetrySettings,
    /// Whole-turn deadline; no deadline when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_timeout_secs: Option<u64>,
    /// Log file for tracing output
    pub log_file: PathBuf,
    pub database: DatabaseConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_history: 10,
            reference_file: PathBuf::from("instructions.txt"),
            vector_dir: PathBuf::from("vector_store"),
            chunk_size: 1000,
            chunk_overlap: 50,
            top_k: 5,
            sample_rows: 5,
            embedding_provider: EmbeddingProviderKind::Tfidf,
            retry: RetrySettings::default(),
            turn_timeout_secs: None,
            log_file: PathBuf::from("askdb.log"),
            database: DatabaseConfig::default(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub model: Option<String>,
    pub max_history: Option<usize>,
    pub reference_file: Option<PathBuf>,
    pub vector_dir: Option<PathBuf>,
    pub top_k: Option<usize>,
    pub embedding_provider: Option<EmbeddingProviderKind>,
    pub turn_timeout_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub sqlite_path: Option<PathBuf>,
}

impl AppConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(max_history) = update.max_history {
            self.max_history = max_history;
        }
        if let Some(reference_file) = update.reference_file {
            self.reference_file = reference_file;
        }
        if let Some(vector_dir) = update.vector_dir {
            self.vector_dir = vector_dir;
        }
        if let Some(top_k) = update.top_k {
            self.top_k = top_k;
        }
        if let Some(provider) = update.embedding_provider {
            self.embedding_provider = provider;
        }
        if let Some(timeout) = update.turn_timeout_secs {
            self.turn_timeout_secs = Some(timeout);
        }
        if let Some(log_file) = update.log_file {
            self.log_file = log_file;
        }
        if let Some(path) = update.sqlite_path {
            self.database.sqlite_path = Some(path);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }

        if self.max_history == 0 {
            return Err("max_history must be at least 1".to_string());
        }

        if self.chunk_size == 0 {
            return Err("chunk_size must be at least 1".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }

        if self.top_k == 0 {
            return Err("top_k must be at least 1".to_string());
        }

        if self.turn_timeout_secs == Some(0) {
            return Err("turn_timeout_secs must be at least 1 when set".to_string());
        }

        self.retry.to_policy().validate().map_err(|e| e.to_string())?;

        Ok(())
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_history, 10);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::Tfidf);
        assert_eq!(config.retry.to_policy(), RetryPolicy::default());
        assert!(config.turn_timeout().is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"model": "gpt-4o", "retry": {"max_attempts": 5}}"#).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_apply_update() {
        let mut config = AppConfig::default();
        let update = SettingsUpdate {
            model: Some("gpt-4o".to_string()),
            sqlite_path: Some(PathBuf::from("local.db")),
            ..Default::default()
        };
        config.apply_update(update);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.database.sqlite_path, Some(PathBuf::from("local.db")));
        // Other fields should remain unchanged
        assert_eq!(config.max_history, 10);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.turn_timeout_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_embedding_provider_from_str() {
        assert_eq!(
            "OpenAI".parse::<EmbeddingProviderKind>().unwrap(),
            EmbeddingProviderKind::Openai
        );
        assert!("chroma".parse::<EmbeddingProviderKind>().is_err());
    }
}
