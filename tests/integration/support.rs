//! Test doubles shared by the integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use askdb::services::pipeline::{ChatPipeline, PipelineSettings};
use askdb::storage::schema::load_schema_context;
use askdb::storage::sqlite::SqliteBackend;
use askdb_core::RetryPolicy;
use askdb_llm::{
    LlmError, LlmProvider, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig,
    ResilientCaller, StopReason, UsageStats,
};
use askdb_sql::{BackendError, QueryBackend, Row, SqlExecutor, TableSchema};
use async_trait::async_trait;

/// Replies from a fixed script and records every request it receives.
pub struct ScriptedProvider {
    config: ProviderConfig,
    replies: Mutex<VecDeque<LlmResult<String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<LlmResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            config: ProviderConfig::default(),
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        _options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        self.requests.lock().unwrap().push(messages);
        let next = self.replies.lock().unwrap().pop_front();
        let reply = next.unwrap_or_else(|| {
            Err(LlmError::Other {
                message: "script exhausted".to_string(),
            })
        })?;
        Ok(LlmResponse {
            content: Some(reply),
            stop_reason: StopReason::EndTurn,
            usage: UsageStats {
                input_tokens: 20,
                output_tokens: 5,
            },
            model: self.config.model.clone(),
        })
    }

    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Backend that counts calls and fails any statement containing `boom`.
#[derive(Default)]
pub struct CountingBackend {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl CountingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(sql.to_string());
        if sql.contains("boom") {
            return Err(BackendError::query("no such column: boom"));
        }
        let mut row = Row::new();
        row.insert("n".to_string(), serde_json::json!(self.calls()));
        Ok(vec![row])
    }

    async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema, BackendError> {
        Ok(TableSchema {
            name: table.to_string(),
            columns: Vec::new(),
        })
    }
}

/// In-memory SQLite with `t(x numeric)` holding 1, 2 and 3.
pub fn sample_database() -> Arc<dyn QueryBackend> {
    let backend = SqliteBackend::in_memory().unwrap();
    backend
        .execute_batch("CREATE TABLE t (x NUMERIC); INSERT INTO t VALUES (1), (2), (3);")
        .unwrap();
    Arc::new(backend)
}

/// Single-attempt policy so scripted failures surface immediately.
pub fn no_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(1), 2.0)
}

/// A pipeline over `backend` with the schema context loaded from it.
pub async fn pipeline_for(
    provider: Arc<ScriptedProvider>,
    backend: Option<Arc<dyn QueryBackend>>,
) -> ChatPipeline {
    let schema = load_schema_context(backend.as_ref(), 5).await;
    ChatPipeline::new(
        ResilientCaller::new(provider, no_retry()),
        SqlExecutor::new(backend),
        schema,
        "",
        PipelineSettings::default(),
    )
    .unwrap()
}
