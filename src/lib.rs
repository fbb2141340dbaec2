//! askdb - Conversational Database Querying
//!
//! Answers natural-language questions about a relational database by asking
//! a chat model for read-only SQL, running it, and having the model explain
//! the results. It includes:
//! - REPL command handling
//! - The per-turn chat pipeline and its services
//! - Storage layer (config file, SQLite and PostgreSQL backends)
//! - Data models and utilities

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use commands::{run_command, ReplCommand};
pub use models::session::{Turn, TurnRole};
pub use models::settings::{AppConfig, EmbeddingProviderKind, SettingsUpdate};
pub use services::{ChatPipeline, ChatSession, PipelineSettings, TurnOutcome, TurnStage};
pub use state::{AppState, Banner};
pub use storage::config::ConfigService;
pub use utils::error::{AppError, AppResult};
