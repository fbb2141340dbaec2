//! Executor Integration Tests
//!
//! The safety gate and per-statement isolation, observed from the backend
//! side and through a full pipeline turn.

use std::sync::Arc;

use askdb::services::pipeline::QUERIES_FAILED_PREFIX;
use askdb::services::session::ChatSession;
use askdb_sql::{QueryBackend, SqlExecutor, QUERY_BLOCKED_MESSAGE};

use crate::support::{pipeline_for, sample_database, CountingBackend, ScriptedProvider};

fn statements(sql: &[&str]) -> Vec<String> {
    sql.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_middle_failure_does_not_stop_the_batch() {
    let backend = Arc::new(CountingBackend::default());
    let executor = SqlExecutor::new(Some(backend.clone() as Arc<dyn QueryBackend>));

    let report = executor
        .execute_all(&statements(&["SELECT 1;", "SELECT boom;", "SELECT 3;"]))
        .await;

    assert_eq!(backend.calls(), 3);
    assert_eq!(report.outcomes.len(), 3);
    assert!(!report.outcomes[0].result.is_error());
    assert!(report.outcomes[1].result.is_error());
    assert!(!report.outcomes[2].result.is_error());
    assert_eq!(report.errors, vec!["no such column: boom"]);
}

#[tokio::test]
async fn test_unsafe_statements_never_reach_the_backend() {
    let backend = Arc::new(CountingBackend::default());
    let executor = SqlExecutor::new(Some(backend.clone() as Arc<dyn QueryBackend>));

    let report = executor
        .execute_all(&statements(&[
            "DROP TABLE t;",
            "-- harmless\nSELECT 1;",
            "update t set x = 0;",
            "/* c */ with q as (select 1) select * from q;",
        ]))
        .await;

    assert_eq!(backend.calls(), 2);
    assert_eq!(
        backend.seen(),
        vec![
            "-- harmless\nSELECT 1;".to_string(),
            "/* c */ with q as (select 1) select * from q;".to_string(),
        ]
    );
    assert_eq!(
        report.errors,
        vec![QUERY_BLOCKED_MESSAGE, QUERY_BLOCKED_MESSAGE]
    );
}

#[tokio::test]
async fn test_blocked_statement_leaves_sqlite_untouched() {
    let provider = ScriptedProvider::replying(&[
        r#"{"needs_sql": true, "sql": ["DELETE FROM t;"], "notes": ""}"#,
    ]);
    let database = sample_database();
    let pipeline = pipeline_for(provider, Some(database.clone())).await;
    let mut session = ChatSession::new();

    let outcome = pipeline.handle_turn(&mut session, "clear the table").await;

    assert_eq!(
        outcome.answer,
        format!("{}{}", QUERIES_FAILED_PREFIX, QUERY_BLOCKED_MESSAGE)
    );
    let rows = database
        .fetch_rows("SELECT COUNT(*) AS n FROM t")
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], serde_json::json!(3));
}

#[tokio::test]
async fn test_results_json_shape() {
    let executor = SqlExecutor::new(Some(sample_database()));
    let report = executor
        .execute_all(&statements(&["SELECT x FROM t ORDER BY x LIMIT 2;"]))
        .await;

    let json: serde_json::Value = serde_json::from_str(&report.results_json().unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            {"query": "SELECT x FROM t ORDER BY x LIMIT 2;", "result": {"rows": [{"x": 1}, {"x": 2}]}}
        ])
    );
}
