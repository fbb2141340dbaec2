//! Integration Tests Module
//!
//! End-to-end scenarios for askdb: full chat turns against SQLite with a
//! scripted model, statement isolation in the executor, the persisted
//! reference index, and the config file lifecycle.

// Shared scripted provider and counting backend
mod support;

// Full turns through the chat pipeline
mod pipeline_test;

// Safety gate and per-statement error isolation
mod executor_test;

// Reference-text index persistence and retrieval
mod knowledge_test;

// Config file creation, overrides and validation
mod config_test;
