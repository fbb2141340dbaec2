//! Statement Execution
//!
//! `QueryBackend` is the seam to a concrete database. `SqlExecutor` sits in
//! front of it and guarantees two things for every statement:
//! - nothing reaches the backend unless it passed [`crate::safety::is_safe`]
//! - no failure escapes as an `Err`; it becomes a `QueryResult::Error` value
//!
//! Every execution is recorded on the `askdb::audit` tracing target.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::safety::is_safe;

/// Returned for every statement when no database is configured.
pub const NOT_CONFIGURED_MESSAGE: &str = "database connection not configured";

/// Returned for statements rejected by the safety gate.
pub const QUERY_BLOCKED_MESSAGE: &str = "query blocked: only SELECT/WITH permitted";

/// One result row. Keys keep the result set's column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Errors raised by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Query(String),

    #[error("cannot decode column `{column}`: {message}")]
    Decode { column: String, message: String },
}

impl BackendError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }
}

/// A column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// A table and its columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// A database that can run read queries and describe itself.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Short backend identifier for logs (`postgres`, `sqlite`).
    fn name(&self) -> &'static str;

    /// Run `sql` and materialize every row.
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, BackendError>;

    /// User tables, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>, BackendError>;

    /// Columns of `table` in ordinal order.
    async fn describe_table(&self, table: &str) -> Result<TableSchema, BackendError>;
}

/// Outcome of one statement: rows or an error message, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResult {
    Rows { rows: Vec<Row> },
    Error { error: String },
}

impl QueryResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Rows { .. } => None,
        }
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Self::Rows { rows } => Some(rows),
            Self::Error { .. } => None,
        }
    }
}

/// An executed statement, in the shape sent to the synthesis prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementOutcome {
    pub query: String,
    pub result: QueryResult,
}

/// Outcomes of a batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub outcomes: Vec<StatementOutcome>,
    /// Error messages of the failed statements, in order.
    pub errors: Vec<String>,
}

impl ExecutionReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// `[{"query": ..., "result": ...}, ...]`
    pub fn results_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.outcomes)
    }
}

/// Runs gated statements against an optional backend.
#[derive(Clone, Default)]
pub struct SqlExecutor {
    backend: Option<Arc<dyn QueryBackend>>,
}

impl SqlExecutor {
    pub fn new(backend: Option<Arc<dyn QueryBackend>>) -> Self {
        Self { backend }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&Arc<dyn QueryBackend>> {
        self.backend.as_ref()
    }

    /// Execute one statement.
    pub async fn execute(&self, statement: &str) -> QueryResult {
        let Some(backend) = &self.backend else {
            tracing::warn!(
                target: "askdb::audit",
                statement,
                outcome = "not_configured",
                "statement skipped"
            );
            return QueryResult::error(NOT_CONFIGURED_MESSAGE);
        };

        if !is_safe(statement) {
            tracing::warn!(
                target: "askdb::audit",
                backend = backend.name(),
                statement,
                outcome = "blocked",
                "statement rejected by safety gate"
            );
            return QueryResult::error(QUERY_BLOCKED_MESSAGE);
        }

        match backend.fetch_rows(statement).await {
            Ok(rows) => {
                tracing::info!(
                    target: "askdb::audit",
                    backend = backend.name(),
                    statement,
                    outcome = "ok",
                    rows = rows.len(),
                    "statement executed"
                );
                QueryResult::Rows { rows }
            }
            Err(e) => {
                tracing::error!(
                    target: "askdb::audit",
                    backend = backend.name(),
                    statement,
                    outcome = "error",
                    error = %e,
                    "statement failed"
                );
                QueryResult::error(e.to_string())
            }
        }
    }

    /// Execute every statement in order. A failure does not stop the batch.
    pub async fn execute_all(&self, statements: &[String]) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for statement in statements {
            let result = self.execute(statement).await;
            if let Some(message) = result.error_message() {
                report.errors.push(message.to_string());
            }
            report.outcomes.push(StatementOutcome {
                query: statement.clone(),
                result,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every statement and fails the ones containing `fail`.
    #[derive(Default)]
    struct RecordingBackend {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, BackendError> {
            self.seen.lock().unwrap().push(sql.to_string());
            if sql.contains("fail") {
                return Err(BackendError::query("column \"fail\" does not exist"));
            }
            let mut row = Row::new();
            row.insert("z".to_string(), json!(1));
            row.insert("a".to_string(), json!("x"));
            Ok(vec![row])
        }

        async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec!["t".to_string()])
        }

        async fn describe_table(&self, table: &str) -> Result<TableSchema, BackendError> {
            Ok(TableSchema {
                name: table.to_string(),
                columns: Vec::new(),
            })
        }
    }

    fn executor() -> (Arc<RecordingBackend>, SqlExecutor) {
        let backend = Arc::new(RecordingBackend::default());
        let executor = SqlExecutor::new(Some(backend.clone() as Arc<dyn QueryBackend>));
        (backend, executor)
    }

    #[tokio::test]
    async fn test_not_configured() {
        let executor = SqlExecutor::new(None);
        assert!(!executor.is_configured());
        let result = executor.execute("SELECT 1;").await;
        assert_eq!(result.error_message(), Some(NOT_CONFIGURED_MESSAGE));
    }

    #[tokio::test]
    async fn test_unsafe_statement_never_reaches_backend() {
        let (backend, executor) = executor();
        let result = executor.execute("DROP TABLE t;").await;
        assert_eq!(result.error_message(), Some(QUERY_BLOCKED_MESSAGE));
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_value() {
        let (_backend, executor) = executor();
        let result = executor.execute("SELECT fail FROM t;").await;
        assert_eq!(
            result,
            QueryResult::error("column \"fail\" does not exist")
        );
    }

    #[tokio::test]
    async fn test_rows_keep_column_order() {
        let (_backend, executor) = executor();
        let result = executor.execute("SELECT z, a FROM t;").await;
        let rows = result.rows().unwrap();
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, ["z", "a"]);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let (backend, executor) = executor();
        let statements = vec![
            "SELECT 1;".to_string(),
            "SELECT fail;".to_string(),
            "SELECT 3;".to_string(),
        ];
        let report = executor.execute_all(&statements).await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.outcomes[0].result.is_error());
        assert!(report.outcomes[1].result.is_error());
        assert!(!report.outcomes[2].result.is_error());
        assert_eq!(
            backend.seen.lock().unwrap().as_slice(),
            ["SELECT 1;", "SELECT fail;", "SELECT 3;"]
        );
    }

    #[test]
    fn test_result_serialization_shape() {
        let ok = StatementOutcome {
            query: "SELECT 1;".to_string(),
            result: QueryResult::Rows { rows: Vec::new() },
        };
        let err = StatementOutcome {
            query: "SELECT x;".to_string(),
            result: QueryResult::error("boom"),
        };
        let report = ExecutionReport {
            outcomes: vec![ok, err],
            errors: vec!["boom".to_string()],
        };
        assert_eq!(
            report.results_json().unwrap(),
            r#"[{"query":"SELECT 1;","result":{"rows":[]}},{"query":"SELECT x;","result":{"error":"boom"}}]"#
        );

        let parsed: QueryResult = serde_json::from_str(r#"{"error": "boom"}"#).unwrap();
        assert!(parsed.is_error());
    }
}
