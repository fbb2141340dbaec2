//! Reference Index Integration Tests
//!
//! Builds the index from a reference file on disk, reopens it the way a new
//! session would, and checks that retrieval feeds the decision request.

use askdb::services::knowledge::{text_hash, ContextRetriever, TfIdfEmbedder};
use askdb::services::pipeline::{ChatPipeline, PipelineSettings};
use askdb::services::reference::load_reference_text;
use askdb::services::session::ChatSession;
use askdb::storage::schema::load_schema_context;
use askdb_llm::ResilientCaller;
use askdb_sql::SqlExecutor;

use crate::support::{no_retry, sample_database, ScriptedProvider};

const REFERENCE: &str = "Column x holds the boiler pressure in bar.\n\n\
                         Values above 2 bar trigger a maintenance alert.\n\n\
                         The table is refreshed nightly from the plant historian.";

fn write_reference(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("instructions.txt");
    std::fs::write(&path, format!("\n{}\n", REFERENCE)).unwrap();
    path
}

#[tokio::test]
async fn test_index_survives_a_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let text = load_reference_text(&write_reference(tmp.path()));
    assert_eq!(text, REFERENCE);

    let vectors = tmp.path().join("vectors");
    let first = ContextRetriever::new(Box::new(TfIdfEmbedder::new()), &vectors)
        .build_index(&text, 60, 0)
        .await
        .unwrap()
        .unwrap();
    assert!(first.was_rebuilt());
    assert_eq!(first.len(), 3);
    assert_eq!(
        std::fs::read_to_string(vectors.join("text_hash.txt")).unwrap(),
        text_hash(&text)
    );

    let retriever = ContextRetriever::new(Box::new(TfIdfEmbedder::new()), &vectors);
    let second = retriever.build_index(&text, 60, 0).await.unwrap().unwrap();
    assert!(!second.was_rebuilt());

    let hit = retriever.retrieve(&second, "maintenance alert", 1).await;
    assert_eq!(hit, "Values above 2 bar trigger a maintenance alert.");
}

#[tokio::test]
async fn test_retrieved_chunks_reach_the_decision_request() {
    let tmp = tempfile::tempdir().unwrap();
    let text = load_reference_text(&write_reference(tmp.path()));

    let retriever = ContextRetriever::new(Box::new(TfIdfEmbedder::new()), tmp.path().join("v"));
    let index = retriever.build_index(&text, 60, 0).await.unwrap().unwrap();

    let provider = ScriptedProvider::replying(&[
        r#"{"needs_sql": false, "sql": [], "notes": ""}"#,
        "Pressure is in bar.",
    ]);
    let database = sample_database();
    let schema = load_schema_context(Some(&database), 5).await;
    let settings = PipelineSettings {
        top_k: 1,
        ..Default::default()
    };
    let pipeline = ChatPipeline::new(
        ResilientCaller::new(provider.clone(), no_retry()),
        SqlExecutor::new(Some(database)),
        schema,
        &text,
        settings,
    )
    .unwrap()
    .with_retriever(retriever, index);

    // The whole reference text is part of the system prompt
    assert!(pipeline.system_prompt().contains("plant historian"));
    assert_eq!(
        pipeline.context_snapshot().await,
        "Column x holds the boiler pressure in bar."
    );

    let mut session = ChatSession::new();
    let outcome = pipeline
        .handle_turn(&mut session, "what unit is the pressure in?")
        .await;
    assert_eq!(outcome.answer, "Pressure is in bar.");

    let requests = provider.requests();
    let decision_context = &requests[0][2].content;
    assert!(decision_context.ends_with("boiler pressure in bar."));
    let general_system = &requests[1][0].content;
    assert!(general_system.contains("Contextual information about the database"));
    assert!(general_system.contains("boiler pressure in bar."));
}
