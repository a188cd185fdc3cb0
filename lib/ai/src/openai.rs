//! OpenAI-compatible chat-completions backend.
//!
//! Failures are classified here, at the adapter boundary, into the
//! structured [`LlmError`] kinds the orchestrator matches on.

use crate::backend::{LlmBackend, LlmBackendConfig, LlmProvider, LlmRequest, LlmResponse, TokenUsage};
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Body text fragments that mark a billing or quota failure.
const QUOTA_MARKERS: &[&str] = &[
    "insufficient_quota",
    "insufficient credits",
    "quota",
    "billing",
    "payment required",
];

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Backend speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: Client,
    config: LlmBackendConfig,
}

impl OpenAiBackend {
    /// Creates a backend from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the API key is empty or the HTTP client
    /// cannot be built.
    pub fn new(config: LlmBackendConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "API key is empty".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: request
                .messages()
                .into_iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "provider returned error status");
            return Err(classify_http_failure(status, &text, retry_after));
        }

        parse_completion(&text, &self.config.model)
    }

    fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

fn classify_transport_error(error: &reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport {
            reason: error.to_string(),
        }
    }
}

fn has_quota_marker(body: &str) -> bool {
    let lower = body.to_lowercase();
    QUOTA_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Maps a non-success HTTP exchange onto an error kind.
#[must_use]
pub fn classify_http_failure(status: StatusCode, body: &str, retry_after: Option<u64>) -> LlmError {
    let reason = summarize_body(body);
    match status {
        StatusCode::PAYMENT_REQUIRED => LlmError::QuotaExceeded { reason },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            if has_quota_marker(body) {
                LlmError::QuotaExceeded { reason }
            } else {
                LlmError::Auth {
                    status: status.as_u16(),
                    reason,
                }
            }
        }
        StatusCode::TOO_MANY_REQUESTS => {
            if has_quota_marker(body) {
                LlmError::QuotaExceeded { reason }
            } else {
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::Timeout,
        _ if has_quota_marker(body) => LlmError::QuotaExceeded { reason },
        _ => LlmError::RequestFailed {
            status: status.as_u16(),
            reason,
        },
    }
}

/// Pulls `error.message` out of an OpenAI error body, else truncates the raw text.
fn summarize_body(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });
    message.unwrap_or_else(|| body.chars().take(200).collect())
}

fn parse_completion(body: &str, requested_model: &str) -> Result<LlmResponse, LlmError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::ResponseParseFailed {
            reason: e.to_string(),
        })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| LlmError::ResponseParseFailed {
            reason: "response carried no message content".to_string(),
        })?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(LlmResponse {
        content,
        usage,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
    })
}
