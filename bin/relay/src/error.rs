//! Error types for the relay binary.
//!
//! Both are startup failures carried in a `rootcause` report up to `main`.
//! Once the relay is running, per-message failures are logged and answered
//! instead of propagated.

use std::fmt;

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The environment could not be read into the configuration shape.
    Load { reason: String },
    /// A required setting is absent.
    Missing { key: &'static str },
    /// A required setting still holds the sample placeholder.
    Placeholder { key: &'static str },
    /// A setting has an unusable value.
    Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { reason } => write!(f, "failed to load configuration: {reason}"),
            Self::Missing { key } => write!(f, "required setting {key} is not set"),
            Self::Placeholder { key } => {
                write!(f, "setting {key} still holds the placeholder value")
            }
            Self::Invalid { key, reason } => write!(f, "invalid {key}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failures while starting or running the relay loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Configuration was rejected.
    Config { reason: String },
    /// The persona file could not be used.
    Persona { reason: String },
    /// A chat platform call needed for startup failed.
    Gateway { operation: &'static str, reason: String },
    /// The webhook listener could not be bound.
    Bind { addr: String, reason: String },
    /// The webhook server stopped with an error.
    Server { reason: String },
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "configuration rejected: {reason}"),
            Self::Persona { reason } => write!(f, "persona unusable: {reason}"),
            Self::Gateway { operation, reason } => {
                write!(f, "chat platform call '{operation}' failed: {reason}")
            }
            Self::Bind { addr, reason } => write!(f, "cannot listen on {addr}: {reason}"),
            Self::Server { reason } => write!(f, "webhook server error: {reason}"),
        }
    }
}

impl std::error::Error for RelayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_key() {
        let err = ConfigError::Missing {
            key: "TELEGRAM_BOT_TOKEN",
        };
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn gateway_error_names_the_operation() {
        let err = RelayError::Gateway {
            operation: "setWebhook",
            reason: "bad url".to_string(),
        };
        assert!(err.to_string().contains("setWebhook"));
        assert!(err.to_string().contains("bad url"));
    }
}
