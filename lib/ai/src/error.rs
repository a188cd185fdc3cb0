//! Error types for the AI crate.
//!
//! - `LlmError`: failures of a remote model call, classified at the adapter
//!   boundary so the orchestrator can match on the kind of failure
//! - `PersonaError`: loading or validating a persona library

use std::fmt;

/// Errors from LLM backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// No response within the configured bound.
    Timeout,
    /// The request never produced an HTTP response.
    Transport { reason: String },
    /// The provider rejected the credentials.
    Auth { status: u16, reason: String },
    /// Billing, credit, or quota exhaustion.
    QuotaExceeded { reason: String },
    /// The provider asked us to slow down.
    RateLimited { retry_after_secs: Option<u64> },
    /// The body could not be understood.
    ResponseParseFailed { reason: String },
    /// Any other non-success status.
    RequestFailed { status: u16, reason: String },
    /// The backend could not be constructed.
    InvalidConfig { reason: String },
}

/// Coarse classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Needs operator action (credentials, billing). Surfaced distinctly.
    OperatorFacing,
    /// Anything the fallback persona can silently cover for.
    Transient,
}

impl LlmError {
    /// Classifies the failure.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Auth { .. } | Self::QuotaExceeded { .. } => FailureClass::OperatorFacing,
            _ => FailureClass::Transient,
        }
    }

    /// Returns true for auth and quota failures.
    #[must_use]
    pub fn is_operator_facing(&self) -> bool {
        self.class() == FailureClass::OperatorFacing
    }

    /// Returns true if this failure should switch the relay to the fallback
    /// provider.
    #[must_use]
    pub fn degrades_provider(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::Transport { .. }
                | Self::Auth { .. }
                | Self::QuotaExceeded { .. }
                | Self::RateLimited { .. }
        )
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::Transport { reason } => write!(f, "LLM transport error: {reason}"),
            Self::Auth { status, reason } => {
                write!(f, "LLM provider rejected credentials ({status}): {reason}")
            }
            Self::QuotaExceeded { reason } => write!(f, "LLM quota exceeded: {reason}"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::RequestFailed { status, reason } => {
                write!(f, "LLM request failed ({status}): {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid LLM configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for LlmError {}

/// Errors from persona library operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonaError {
    /// The persona file could not be read.
    ReadFailed { path: String, reason: String },
    /// The persona file is not valid JSON for a persona.
    ParseFailed { reason: String },
    /// The persona is structurally unusable.
    Invalid { reason: String },
}

impl fmt::Display for PersonaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { path, reason } => {
                write!(f, "failed to read persona file '{path}': {reason}")
            }
            Self::ParseFailed { reason } => write!(f, "failed to parse persona: {reason}"),
            Self::Invalid { reason } => write!(f, "invalid persona: {reason}"),
        }
    }
}

impl std::error::Error for PersonaError {}
