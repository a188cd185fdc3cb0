//! Failover between the primary and fallback providers.
//!
//! The orchestrator is a two-state machine shared by every user:
//!
//! - `Primary`: each request is attempted against the remote model.
//! - `Degraded`: requests go straight to the scripted fallback.
//!
//! `Primary -> Degraded` happens when a remote call fails with a degrading
//! error kind. `Degraded -> Primary` happens only through [`probe`], which
//! performs a real call and observes it succeed.
//!
//! [`probe`]: ResponseOrchestrator::probe

use crate::error::LlmError;
use crate::provider::{FallbackProvider, ResponseProvider};
use palaver_conversation::ConversationHistory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, instrument, warn};

/// Which provider currently serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    /// Remote model is used.
    Primary,
    /// Only the fallback is used.
    Degraded,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Degraded => f.write_str("degraded"),
        }
    }
}

/// Process-wide provider health flag.
///
/// Reads and writes are sequentially consistent, so a flip made while
/// handling one user's message is seen by every later read from any task.
#[derive(Debug, Default)]
pub struct ProviderHealth {
    using_fallback: AtomicBool,
}

impl ProviderHealth {
    /// Creates the flag in the given state.
    #[must_use]
    pub fn new(state: ProviderState) -> Self {
        Self {
            using_fallback: AtomicBool::new(state == ProviderState::Degraded),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ProviderState {
        if self.using_fallback.load(Ordering::SeqCst) {
            ProviderState::Degraded
        } else {
            ProviderState::Primary
        }
    }

    /// Switches to `Degraded`. Returns true if the state changed.
    pub fn mark_degraded(&self) -> bool {
        !self.using_fallback.swap(true, Ordering::SeqCst)
    }

    /// Switches to `Primary`. Returns true if the state changed.
    pub fn mark_primary(&self) -> bool {
        self.using_fallback.swap(false, Ordering::SeqCst)
    }
}

/// Which path produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    /// The remote model answered.
    Primary,
    /// The scripted fallback answered.
    Fallback,
    /// The remote model reported a billing or credential failure.
    ServiceUnavailable,
}

impl fmt::Display for ReplySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
            Self::ServiceUnavailable => f.write_str("service_unavailable"),
        }
    }
}

/// A reply and the path that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text to deliver.
    pub text: String,
    /// Path that produced the text.
    pub source: ReplySource,
}

/// Failover policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Keep serving from the fallback after a degrading failure instead of
    /// retrying the primary on the next request.
    pub sticky_degrade: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sticky_degrade: true,
        }
    }
}

/// Chooses a provider per request and owns the health state.
pub struct ResponseOrchestrator {
    primary: Option<Arc<dyn ResponseProvider>>,
    fallback: FallbackProvider,
    health: ProviderHealth,
    config: OrchestratorConfig,
}

impl ResponseOrchestrator {
    /// Creates an orchestrator.
    ///
    /// Starts in `Primary` if a primary provider is given, else `Degraded`.
    #[must_use]
    pub fn new(
        primary: Option<Arc<dyn ResponseProvider>>,
        fallback: FallbackProvider,
        config: OrchestratorConfig,
    ) -> Self {
        let initial = if primary.is_some() {
            ProviderState::Primary
        } else {
            ProviderState::Degraded
        };
        info!(state = %initial, "response orchestrator initialised");
        Self {
            primary,
            fallback,
            health: ProviderHealth::new(initial),
            config,
        }
    }

    /// Returns the current provider state.
    #[must_use]
    pub fn state(&self) -> ProviderState {
        self.health.state()
    }

    /// Returns true if a primary provider is configured at all.
    #[must_use]
    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Returns the fallback provider.
    #[must_use]
    pub fn fallback(&self) -> &FallbackProvider {
        &self.fallback
    }

    fn active_primary(&self) -> Option<&Arc<dyn ResponseProvider>> {
        self.primary
            .as_ref()
            .filter(|_| self.health.state() == ProviderState::Primary)
    }

    fn fallback_reply(&self, history: &ConversationHistory) -> Reply {
        Reply {
            text: self.fallback.reply(history),
            source: ReplySource::Fallback,
        }
    }

    fn record_failure(&self, err: &LlmError) {
        if self.config.sticky_degrade && err.degrades_provider() && self.health.mark_degraded() {
            warn!(error = %err, "primary provider failing, switching to fallback");
        }
    }

    /// Produces a reply for the history. Never fails and never returns an
    /// empty text.
    #[instrument(skip_all, fields(turns = history.len()))]
    pub async fn get_response(&self, history: &ConversationHistory) -> Reply {
        let Some(primary) = self.active_primary() else {
            return self.fallback_reply(history);
        };

        match primary.produce(history).await {
            Ok(text) => Reply {
                text,
                source: ReplySource::Primary,
            },
            Err(err) => {
                self.record_failure(&err);
                if err.is_operator_facing() {
                    error!(error = %err, "primary provider needs operator attention");
                    Reply {
                        text: self.fallback.persona().service_unavailable.clone(),
                        source: ReplySource::ServiceUnavailable,
                    }
                } else {
                    warn!(error = %err, "primary provider failed, using fallback");
                    self.fallback_reply(history)
                }
            }
        }
    }

    /// Reports whether the relay can answer.
    ///
    /// Always true: in `Degraded` the fallback answers without any remote
    /// call; in `Primary` a minimal remote call is made and a failure flips
    /// the state to `Degraded`.
    pub async fn is_healthy(&self) -> bool {
        let Some(primary) = self.active_primary() else {
            return true;
        };
        if let Err(err) = primary.health_check().await {
            error!(error = %err, "primary health check failed");
            if self.health.mark_degraded() {
                warn!("switching to fallback after failed health check");
            }
        }
        true
    }

    /// Explicitly probes the primary provider in either state.
    ///
    /// Success restores `Primary`; failure leaves or puts the orchestrator
    /// in `Degraded`. Returns whether the primary answered.
    pub async fn probe(&self) -> bool {
        let Some(primary) = self.primary.as_ref() else {
            return false;
        };
        match primary.health_check().await {
            Ok(()) => {
                if self.health.mark_primary() {
                    info!("primary provider recovered");
                }
                true
            }
            Err(err) => {
                warn!(error = %err, "primary probe failed");
                self.health.mark_degraded();
                false
            }
        }
    }
}

impl fmt::Debug for ResponseOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseOrchestrator")
            .field("primary", &self.primary.as_ref().map(|p| p.name()))
            .field("state", &self.health.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
