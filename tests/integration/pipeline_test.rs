//! Chat Pipeline Integration Tests
//!
//! Full turns against an in-memory SQLite database with a scripted model:
//! - decision, execution and synthesis for an aggregate question
//! - literal and fallback decision parsing
//! - error answers for failed statements and an unconfigured database
//! - degraded turns when every model call fails

use askdb::services::pipeline::{TurnStage, QUERIES_FAILED_PREFIX};
use askdb::services::session::ChatSession;
use askdb_llm::{LlmError, MessageRole};
use askdb_sql::{ParseStrategy, NOT_CONFIGURED_MESSAGE};
use serde_json::json;

use crate::support::{pipeline_for, sample_database, ScriptedProvider};

// ============================================================================
// SQL path
// ============================================================================

#[tokio::test]
async fn test_average_question_end_to_end() {
    let provider = ScriptedProvider::replying(&[
        r#"{"needs_sql": true, "sql": ["SELECT AVG(x) AS avg_x FROM t"], "notes": "mean of x"}"#,
        "The average of x is 2.",
    ]);
    let pipeline = pipeline_for(provider.clone(), Some(sample_database())).await;
    let mut session = ChatSession::new();

    let outcome = pipeline
        .handle_turn(&mut session, "What is the average of x?")
        .await;

    assert_eq!(outcome.answer, "The average of x is 2.");
    assert_eq!(outcome.stage, TurnStage::Done);
    assert_eq!(outcome.parse_strategy, Some(ParseStrategy::Json));
    assert_eq!(outcome.decision.sql, vec!["SELECT AVG(x) AS avg_x FROM t;"]);
    assert_eq!(outcome.outcomes.len(), 1);
    assert_eq!(
        outcome.outcomes[0].result.rows().unwrap()[0]["avg_x"],
        json!(2.0)
    );
    assert_eq!(outcome.tokens_used, 50);

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);

    // Decision request: system prompt, history, decision context, instruction
    let decision = &requests[0];
    assert_eq!(decision.len(), 4);
    assert!(decision[0].content.contains("Table t: columns = x (numeric)"));
    assert_eq!(decision[1].role, MessageRole::User);
    assert_eq!(decision[1].content, "What is the average of x?");
    assert!(decision[3].content.contains("Reply ONLY with an EXACT JSON OBJECT"));

    // Synthesis request carries the executed results
    let synthesis = &requests[1];
    let last = synthesis.last().unwrap();
    assert_eq!(last.role, MessageRole::User);
    assert!(last.content.starts_with("Original question: What is the average of x?"));
    assert!(last.content.contains(r#""query":"SELECT AVG(x) AS avg_x FROM t;""#));
    assert!(last.content.contains(r#""avg_x":2.0"#));

    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history()[1].content, "The average of x is 2.");
    assert_eq!(session.history()[1].tokens, 50);
    assert_eq!(session.total_tokens(), 50);
}

#[tokio::test]
async fn test_literal_decision_is_accepted() {
    let provider = ScriptedProvider::replying(&[
        "{'needs_sql': True, 'sql': ['SELECT MAX(x) AS top FROM t;'], 'notes': None}",
        "The largest x is 3.",
    ]);
    let pipeline = pipeline_for(provider, Some(sample_database())).await;
    let mut session = ChatSession::new();

    let outcome = pipeline.handle_turn(&mut session, "largest x?").await;

    assert_eq!(outcome.parse_strategy, Some(ParseStrategy::Literal));
    assert_eq!(outcome.decision.notes, "");
    assert_eq!(outcome.outcomes[0].result.rows().unwrap()[0]["top"], json!(3));
    assert_eq!(outcome.answer, "The largest x is 3.");
}

#[tokio::test]
async fn test_fallback_extraction_from_prose() {
    let provider = ScriptedProvider::replying(&[
        "Sure, I will count them.\n```sql\nSELECT COUNT(*) AS n FROM t\n```",
        "There are 3 rows.",
    ]);
    let pipeline = pipeline_for(provider, Some(sample_database())).await;
    let mut session = ChatSession::new();

    let outcome = pipeline.handle_turn(&mut session, "how many rows?").await;

    assert_eq!(outcome.parse_strategy, None);
    assert!(outcome.decision.needs_sql);
    assert_eq!(outcome.decision.sql, vec!["SELECT COUNT(*) AS n FROM t;"]);
    assert_eq!(outcome.outcomes[0].result.rows().unwrap()[0]["n"], json!(3));
    assert_eq!(outcome.answer, "There are 3 rows.");
}

// ============================================================================
// Error answers
// ============================================================================

#[tokio::test]
async fn test_unconfigured_database_reports_every_statement() {
    let provider = ScriptedProvider::replying(&[
        r#"{"needs_sql": true, "sql": ["SELECT 1;", "SELECT 2;"], "notes": ""}"#,
    ]);
    let pipeline = pipeline_for(provider.clone(), None).await;
    let mut session = ChatSession::new();

    let outcome = pipeline.handle_turn(&mut session, "anything").await;

    assert_eq!(
        outcome.answer,
        format!(
            "{}{}\n{}",
            QUERIES_FAILED_PREFIX, NOT_CONFIGURED_MESSAGE, NOT_CONFIGURED_MESSAGE
        )
    );
    assert_eq!(outcome.outcomes.len(), 2);
    assert!(outcome.outcomes.iter().all(|o| o.result.is_error()));
    // No synthesis call after failed statements
    assert_eq!(provider.requests().len(), 1);
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_failed_statement_skips_synthesis() {
    let provider = ScriptedProvider::replying(&[
        r#"{"needs_sql": true, "sql": ["SELECT AVG(x) FROM t;", "SELECT missing FROM t;"], "notes": ""}"#,
    ]);
    let pipeline = pipeline_for(provider.clone(), Some(sample_database())).await;
    let mut session = ChatSession::new();

    let outcome = pipeline.handle_turn(&mut session, "avg and missing").await;

    assert!(outcome.answer.starts_with(QUERIES_FAILED_PREFIX));
    assert!(outcome.answer.contains("missing"));
    assert_eq!(outcome.answer.lines().count(), 2);
    assert!(!outcome.outcomes[0].result.is_error());
    assert!(outcome.outcomes[1].result.is_error());
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_every_model_call_failing_degrades_the_turn() {
    let provider = ScriptedProvider::new(vec![
        Err(LlmError::NetworkError {
            message: "connection refused".to_string(),
        }),
        Err(LlmError::NetworkError {
            message: "connection refused".to_string(),
        }),
    ]);
    let pipeline = pipeline_for(provider.clone(), Some(sample_database())).await;
    let mut session = ChatSession::new();

    let outcome = pipeline.handle_turn(&mut session, "average of x?").await;

    assert!(!outcome.decision.needs_sql);
    assert!(outcome.decision.notes.starts_with("error: "));
    assert!(outcome
        .answer
        .starts_with("error generating response: model call failed after 1 attempts"));
    assert_eq!(outcome.stage, TurnStage::ErrorAnswer);
    assert_eq!(outcome.tokens_used, 0);
    assert!(outcome.outcomes.is_empty());

    // Both turns are still recorded
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history()[1].content, outcome.answer);
}

// ============================================================================
// Conversation
// ============================================================================

#[tokio::test]
async fn test_follow_up_turn_sees_previous_answer() {
    let provider = ScriptedProvider::replying(&[
        r#"{"needs_sql": true, "sql": ["SELECT AVG(x) AS avg_x FROM t;"], "notes": ""}"#,
        "The average of x is 2.",
        r#"{"needs_sql": false, "sql": [], "notes": "follow-up"}"#,
        "It is the arithmetic mean of all rows.",
    ]);
    let pipeline = pipeline_for(provider.clone(), Some(sample_database())).await;
    let mut session = ChatSession::new();

    pipeline.handle_turn(&mut session, "average of x?").await;
    let outcome = pipeline
        .handle_turn(&mut session, "how was that computed?")
        .await;

    assert_eq!(outcome.answer, "It is the arithmetic mean of all rows.");
    assert!(outcome.outcomes.is_empty());

    let requests = provider.requests();
    let second_decision = &requests[2];
    assert_eq!(second_decision[1].content, "average of x?");
    assert_eq!(second_decision[2].role, MessageRole::Assistant);
    assert_eq!(second_decision[2].content, "The average of x is 2.");
    assert_eq!(second_decision[3].content, "how was that computed?");

    // The no-SQL answer only sees the general instruction and the question
    let general = &requests[3];
    assert_eq!(general.len(), 2);
    assert_eq!(general[1].content, "how was that computed?");

    assert_eq!(session.history().len(), 4);
    assert_eq!(session.total_tokens(), 100);
}
