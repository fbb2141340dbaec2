//! Resilient Model Caller
//!
//! Wraps any `LlmProvider` with the shared retry policy. Each call makes up to
//! `policy.max_attempts` attempts with exponential backoff between them and
//! only fails once every attempt has failed.

use std::fmt;
use std::sync::Arc;

use askdb_core::{retry_with_policy, RetryPolicy};

use crate::provider::LlmProvider;
use crate::types::{LlmError, LlmRequestOptions, LlmResponse, Message};

/// Every attempt allowed by the retry policy failed.
#[derive(Debug, Clone)]
pub struct ModelCallError {
    /// Attempts made before giving up
    pub attempts: u32,
    /// Error returned by the final attempt
    pub source: LlmError,
}

impl fmt::Display for ModelCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model call failed after {} attempts: {}",
            self.attempts, self.source
        )
    }
}

impl std::error::Error for ModelCallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Provider plus retry policy.
#[derive(Clone)]
pub struct ResilientCaller {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl ResilientCaller {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Request one completion for `messages` from `model_id`.
    ///
    /// Every error is retried, including ones `LlmError::is_retryable` marks
    /// as permanent.
    pub async fn call(
        &self,
        model_id: &str,
        messages: &[Message],
    ) -> Result<LlmResponse, ModelCallError> {
        let label = format!("{}:{}", self.provider.name(), model_id);

        let result = retry_with_policy(&self.policy, &label, |attempt| {
            let provider = Arc::clone(&self.provider);
            let messages = messages.to_vec();
            let options = LlmRequestOptions::for_model(model_id);
            async move {
                let outcome = provider.send_message(messages, options).await;
                if let Err(e) = &outcome {
                    tracing::debug!(
                        target: "askdb::llm",
                        attempt = attempt + 1,
                        retryable = e.is_retryable(),
                        "model call attempt errored"
                    );
                }
                outcome
            }
        })
        .await;

        match result {
            Ok(response) => {
                tracing::info!(
                    target: "askdb::llm",
                    model = %response.model,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "model call completed"
                );
                Ok(response)
            }
            Err(exhausted) => Err(ModelCallError {
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            }),
        }
    }
}
