//! askdb LLM
//!
//! Provides the model-calling side of askdb:
//! - `LlmProvider`: the provider trait (one completion per call)
//! - `OpenAIProvider`: chat-completions over HTTP (OpenAI and compatible APIs)
//! - `ResilientCaller`: bounded retry with exponential backoff around any provider
//!
//! Also includes the HTTP client factory shared with the embedding providers.

pub mod http_client;
pub mod openai;
pub mod provider;
pub mod resilient;
pub mod types;

// Re-export main types
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use resilient::{ModelCallError, ResilientCaller};
pub use types::*;
