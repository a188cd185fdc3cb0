//! Error types for the integration crate.
//!
//! - `GatewayError`: failures talking to the chat platform

use std::fmt;

/// Errors from chat platform operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The request never produced an HTTP response.
    Transport { reason: String },
    /// The platform answered with `ok: false`.
    Api { code: u16, description: String },
    /// The platform's answer could not be decoded.
    Decode { reason: String },
    /// The client could not be constructed.
    InvalidConfig { reason: String },
}

impl GatewayError {
    /// Returns true if the platform refused the message itself, e.g. because
    /// its markup did not parse.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Api { code: 400, .. })
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { reason } => write!(f, "transport failure: {reason}"),
            Self::Api { code, description } => {
                write!(f, "platform rejected request ({code}): {description}")
            }
            Self::Decode { reason } => write!(f, "undecodable platform response: {reason}"),
            Self::InvalidConfig { reason } => write!(f, "invalid gateway configuration: {reason}"),
        }
    }
}

impl std::error::Error for GatewayError {}
