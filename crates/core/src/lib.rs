//! askdb Core
//!
//! Foundational types shared by every crate in the askdb workspace. This crate
//! has no knowledge of databases, HTTP, or language-model providers.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `retry` - Retry policy and the generic `retry_with_policy` combinator
//! - `template` - Prompt templates with named slots

pub mod error;
pub mod retry;
pub mod template;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Retry ──────────────────────────────────────────────────────────────
pub use retry::{retry_with_policy, RetryExhausted, RetryPolicy};

// ── Templates ──────────────────────────────────────────────────────────
pub use template::PromptTemplate;
