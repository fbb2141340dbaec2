//! HTTP Client Factory
//!
//! Builds the `reqwest::Client` used by the chat and embedding providers.

use std::time::Duration;

use crate::types::{LlmError, LlmResult};

/// Build a `reqwest::Client` with an optional per-request timeout.
///
/// Proxy settings come from the standard `HTTPS_PROXY` / `NO_PROXY`
/// environment variables, which reqwest honours by default.
pub fn build_http_client(timeout: Option<Duration>) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(concat!(
        "askdb/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("failed to build HTTP client: {}", e),
    })
}
