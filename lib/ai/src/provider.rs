//! Response providers.
//!
//! A provider turns a conversation history into reply text. The primary
//! provider asks a remote model; the fallback provider answers from the
//! persona's scripted replies and cannot fail.

use crate::backend::{LlmBackend, LlmMessage, LlmRequest};
use crate::error::LlmError;
use crate::llm_call;
use crate::persona::Persona;
use async_trait::async_trait;
use palaver_conversation::ConversationHistory;
use std::sync::Arc;
use std::time::Duration;

/// Used as the prompt when a history holds no user turn at all.
const EMPTY_PROMPT: &str = "Hello";

/// Prompt and token bound of the minimal health-check call.
const PROBE_PROMPT: &str = "Test";
const PROBE_MAX_TOKENS: u32 = 5;

/// Capability of producing a reply for a conversation.
#[async_trait]
pub trait ResponseProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produces a reply for the history, whose newest turn is the user's
    /// latest message.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the underlying call.
    async fn produce(&self, history: &ConversationHistory) -> Result<String, LlmError>;

    /// Performs the cheapest call that proves the provider is reachable.
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the probe call.
    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

/// Tunables for requests sent by the primary provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimarySettings {
    /// Maximum earlier turns sent as context.
    pub context_turns: usize,
    /// Token bound for the reply.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Deadline for one remote call.
    pub timeout: Duration,
}

impl Default for PrimarySettings {
    fn default() -> Self {
        Self {
            context_turns: 10,
            max_tokens: 2000,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Provider backed by a remote model.
#[derive(Clone)]
pub struct PrimaryProvider {
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    settings: PrimarySettings,
}

impl PrimaryProvider {
    /// Creates a primary provider.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        system_prompt: impl Into<String>,
        settings: PrimarySettings,
    ) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
            settings,
        }
    }

    /// Builds the remote request: persona instruction, then at most
    /// `context_turns` turns preceding the newest user turn, then that turn.
    #[must_use]
    pub fn build_request(&self, history: &ConversationHistory) -> LlmRequest {
        let mut turns = history.to_vec();
        let prompt = match turns.last() {
            Some(turn) if turn.is_user() => turns
                .pop()
                .map(|t| t.content().to_string())
                .unwrap_or_default(),
            _ => EMPTY_PROMPT.to_string(),
        };

        let skip = turns.len().saturating_sub(self.settings.context_turns);
        let context: Vec<LlmMessage> = turns.iter().skip(skip).map(LlmMessage::from).collect();

        LlmRequest::new(prompt)
            .with_system(self.system_prompt.clone())
            .with_context(context)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
    }
}

impl std::fmt::Debug for PrimaryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryProvider")
            .field("model", &self.backend.model())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResponseProvider for PrimaryProvider {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn produce(&self, history: &ConversationHistory) -> Result<String, LlmError> {
        let request = self.build_request(history);
        let result = llm_call::invoke(self.backend.as_ref(), &request, self.settings.timeout).await?;
        Ok(result.content)
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let request = LlmRequest::new(PROBE_PROMPT).with_max_tokens(PROBE_MAX_TOKENS);
        llm_call::invoke(self.backend.as_ref(), &request, self.settings.timeout)
            .await
            .map(|_| ())
    }
}

/// Scripted provider that always answers.
#[derive(Debug, Clone)]
pub struct FallbackProvider {
    persona: Arc<Persona>,
}

impl FallbackProvider {
    /// Creates a fallback provider speaking as the given persona.
    #[must_use]
    pub fn new(persona: Arc<Persona>) -> Self {
        Self { persona }
    }

    /// Returns the persona.
    #[must_use]
    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Picks a scripted reply for the history's newest user message.
    #[must_use]
    pub fn reply(&self, history: &ConversationHistory) -> String {
        let input = history
            .last_user_turn()
            .map(|t| t.content())
            .unwrap_or_default();
        self.persona.pick_reply(input)
    }
}

#[async_trait]
impl ResponseProvider for FallbackProvider {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn produce(&self, history: &ConversationHistory) -> Result<String, LlmError> {
        Ok(self.reply(history))
    }
}
