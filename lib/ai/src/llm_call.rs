//! A single timed invocation of a backend.
//!
//! Wraps [`LlmBackend::generate`] with a hard deadline and records what
//! the call cost, so every remote call can be traced by its invocation id.

use crate::backend::{LlmBackend, LlmRequest, LlmResponse, TokenUsage};
use crate::error::LlmError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use ulid::Ulid;

/// Unique identifier for an LLM invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LlmInvocationId(Ulid);

impl LlmInvocationId {
    /// Creates a new invocation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for LlmInvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LlmInvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "llm_{}", self.0)
    }
}

/// The result of an LLM Call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallResult {
    /// Unique identifier for this invocation.
    pub id: LlmInvocationId,
    /// The raw text output.
    pub content: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

impl LlmCallResult {
    /// Creates a result from an LLM response.
    #[must_use]
    pub fn from_response(id: LlmInvocationId, response: LlmResponse, latency_ms: u64) -> Self {
        Self {
            id,
            content: response.content,
            usage: response.usage,
            model: response.model,
            timestamp: Utc::now(),
            latency_ms,
        }
    }
}

/// Runs one request against a backend, giving up after `deadline`.
///
/// # Errors
///
/// Returns the backend's error, or `LlmError::Timeout` if the deadline
/// passes first. The pending request is dropped on timeout.
pub async fn invoke(
    backend: &dyn LlmBackend,
    request: &LlmRequest,
    deadline: Duration,
) -> Result<LlmCallResult, LlmError> {
    let id = LlmInvocationId::new();
    let started = Instant::now();

    let outcome = match tokio::time::timeout(deadline, backend.generate(request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(LlmError::Timeout),
    };
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(response) => {
            let result = LlmCallResult::from_response(id, response, latency_ms);
            debug!(
                invocation_id = %id,
                model = %result.model,
                latency_ms,
                tokens = result.usage.total(),
                "LLM call succeeded"
            );
            Ok(result)
        }
        Err(error) => {
            warn!(invocation_id = %id, latency_ms, error = %error, "LLM call failed");
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LlmProvider;
    use async_trait::async_trait;

    struct SlowBackend;

    #[async_trait]
    impl LlmBackend for SlowBackend {
        async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(LlmResponse {
                content: "too late".to_string(),
                usage: TokenUsage::default(),
                model: "slow".to_string(),
            })
        }

        fn provider(&self) -> LlmProvider {
            LlmProvider::OpenAiCompatible
        }

        fn model(&self) -> &str {
            "slow"
        }
    }

    struct EchoBackend;

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                content: request.prompt.clone(),
                usage: TokenUsage {
                    input_tokens: 2,
                    output_tokens: 1,
                },
                model: "echo".to_string(),
            })
        }

        fn provider(&self) -> LlmProvider {
            LlmProvider::OpenAiCompatible
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn invoke_times_out() {
        let err = invoke(&SlowBackend, &LlmRequest::new("hi"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::Timeout);
    }

    #[tokio::test]
    async fn invoke_returns_content() {
        let result = invoke(&EchoBackend, &LlmRequest::new("ping"), Duration::from_secs(1))
            .await
            .expect("call should succeed");
        assert_eq!(result.content, "ping");
        assert_eq!(result.usage.total(), 3);
        assert!(result.id.to_string().starts_with("llm_"));
    }
}
