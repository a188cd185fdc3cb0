//! Relay configuration.
//!
//! Loaded via the `config` crate from environment variables whose names
//! match the field names in upper case (`TELEGRAM_BOT_TOKEN`,
//! `RATE_LIMIT_WINDOW`, ...). Range problems on tuning knobs only warn;
//! missing credentials and unusable structural values are fatal.
//!
//! `RUST_LOG` and `LOG_LEVEL` are read directly by `main`, before this
//! configuration is loaded, so that loading errors are logged too.

use crate::error::ConfigError;
use palaver_ai::backend::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use palaver_core::UserId;
use reqwest::Url;
use rootcause::prelude::Report;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const TOKEN_PLACEHOLDER: &str = "your_telegram_bot_token_here";
const API_KEY_PLACEHOLDER: &str = "your_openai_api_key_here";

/// Relay configuration.
#[derive(Clone, Deserialize)]
pub struct RelayConfig {
    /// Bot API token. Required.
    #[serde(default)]
    pub telegram_bot_token: String,

    /// Remote model key. Without a usable key the relay runs on the
    /// fallback persona only.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Remote model name.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Chat-completions base URL.
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Reply length bound sent with every request.
    #[serde(default = "default_openai_max_tokens")]
    pub openai_max_tokens: u32,

    /// Sampling temperature sent with every request.
    #[serde(default = "default_openai_temperature")]
    pub openai_temperature: f32,

    /// Public webhook URL. Webhook mode iff set, otherwise long polling.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Secret Telegram echoes in every webhook delivery.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Local address the webhook listener binds.
    #[serde(default = "default_webhook_listen")]
    pub webhook_listen: String,

    /// Messages admitted per user per window.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,

    /// Rate limit window in seconds.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window: u32,

    /// Comma-separated admin user ids.
    #[serde(default)]
    pub admin_user_ids: String,

    /// Turns kept per user.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Prior turns sent to the remote model with each message.
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// Bound on each remote model call, in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Idle time after which a session is forgotten. Unset means never.
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,

    /// JSON persona file replacing the built-in persona.
    #[serde(default)]
    pub persona_path: Option<PathBuf>,

    /// Bot username, used to recognise `/command@username`.
    #[serde(default)]
    pub bot_username: Option<String>,
}

fn default_openai_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_openai_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_openai_max_tokens() -> u32 {
    2000
}

fn default_openai_temperature() -> f32 {
    0.7
}

fn default_webhook_listen() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_rate_limit_requests() -> u32 {
    10
}

fn default_rate_limit_window() -> u32 {
    60
}

fn default_history_window() -> usize {
    20
}

fn default_context_turns() -> usize {
    10
}

fn default_provider_timeout_secs() -> u64 {
    30
}

/// How updates reach the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateMode {
    /// Telegram pushes updates to a local HTTP listener.
    Webhook {
        url: Url,
        path: String,
        secret: Option<String>,
        listen: SocketAddr,
    },
    /// The relay long-polls `getUpdates`.
    Polling,
}

impl RelayConfig {
    /// Loads and validates configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, Report<ConfigError>> {
        Self::load(config::Environment::default())
    }

    /// Loads and validates configuration from an explicit variable map.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_vars(vars: config::Map<String, String>) -> Result<Self, Report<ConfigError>> {
        Self::load(config::Environment::default().source(Some(vars)))
    }

    fn load(env: config::Environment) -> Result<Self, Report<ConfigError>> {
        let config: Self = config::Config::builder()
            .add_source(env.separator("__").try_parsing(true).ignore_empty(true))
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| ConfigError::Load {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the loaded values.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing or placeholder bot token, or for
    /// structural values the relay cannot run with.
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        let token = self.telegram_bot_token.trim();
        if token.is_empty() {
            return Err(ConfigError::Missing {
                key: "TELEGRAM_BOT_TOKEN",
            }
            .into());
        }
        if token == TOKEN_PLACEHOLDER {
            return Err(ConfigError::Placeholder {
                key: "TELEGRAM_BOT_TOKEN",
            }
            .into());
        }
        if self.rate_limit_requests == 0 {
            return Err(invalid("RATE_LIMIT_REQUESTS", "must be at least 1"));
        }
        if self.rate_limit_window == 0 {
            return Err(invalid("RATE_LIMIT_WINDOW", "must be at least 1 second"));
        }
        if self.history_window == 0 {
            return Err(invalid("HISTORY_WINDOW", "must be at least 1"));
        }
        if self.provider_timeout_secs == 0 {
            return Err(invalid("PROVIDER_TIMEOUT_SECS", "must be at least 1 second"));
        }
        if self.session_ttl_secs == Some(0) {
            return Err(invalid("SESSION_TTL_SECS", "must be at least 1 second when set"));
        }
        self.update_mode()?;

        if !(100..=4000).contains(&self.openai_max_tokens) {
            warn!(
                max_tokens = self.openai_max_tokens,
                "OPENAI_MAX_TOKENS may be outside the useful range 100..=4000"
            );
        }
        if !(0.0..=2.0).contains(&self.openai_temperature) {
            warn!(
                temperature = self.openai_temperature,
                "OPENAI_TEMPERATURE may be outside the useful range 0..=2"
            );
        }
        if self.context_turns >= self.history_window {
            warn!(
                context_turns = self.context_turns,
                history_window = self.history_window,
                "CONTEXT_TURNS not below HISTORY_WINDOW, the whole window will be sent"
            );
        }
        Ok(())
    }

    /// Returns the remote model key, if one is usable.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != API_KEY_PLACEHOLDER)
    }

    /// Parses the admin list, dropping entries that are not user ids.
    #[must_use]
    pub fn admin_ids(&self) -> HashSet<UserId> {
        self.admin_user_ids
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match entry.parse::<UserId>() {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "ignoring invalid ADMIN_USER_IDS entry");
                    None
                }
            })
            .collect()
    }

    /// Context turns actually sent, never more than the window holds.
    #[must_use]
    pub fn effective_context_turns(&self) -> usize {
        self.context_turns.min(self.history_window)
    }

    /// Bound on each remote model call.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Idle session lifetime, if sessions expire at all.
    #[must_use]
    pub fn session_ttl(&self) -> Option<chrono::Duration> {
        self.session_ttl_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(chrono::Duration::seconds)
    }

    /// Resolves how updates are received.
    ///
    /// # Errors
    ///
    /// Returns an error if webhook mode is selected with an unusable URL or
    /// listen address.
    pub fn update_mode(&self) -> Result<UpdateMode, Report<ConfigError>> {
        let Some(raw) = self.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            return Ok(UpdateMode::Polling);
        };
        let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
            key: "WEBHOOK_URL",
            reason: e.to_string(),
        })?;
        if url.scheme() != "https" {
            return Err(invalid("WEBHOOK_URL", "Telegram only delivers to https URLs"));
        }
        let listen = self
            .webhook_listen
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "WEBHOOK_LISTEN",
                reason: e.to_string(),
            })?;
        let path = match url.path() {
            "" | "/" => "/webhook".to_string(),
            other => other.to_string(),
        };
        let secret = self
            .webhook_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(UpdateMode::Webhook {
            url,
            path,
            secret,
            listen,
        })
    }

    /// Logs the effective configuration without secrets.
    pub fn log_summary(&self) {
        info!(
            bot_username = self.bot_username.as_deref().unwrap_or("-"),
            webhook = self.webhook_url.is_some(),
            admins = self.admin_ids().len(),
            model = %self.openai_model,
            primary_configured = self.api_key().is_some(),
            max_tokens = self.openai_max_tokens,
            temperature = self.openai_temperature,
            rate_limit = self.rate_limit_requests,
            rate_window_secs = self.rate_limit_window,
            history_window = self.history_window,
            context_turns = self.effective_context_turns(),
            session_ttl_secs = ?self.session_ttl_secs,
            "relay configuration loaded"
        );
    }
}

fn invalid(key: &'static str, reason: &str) -> Report<ConfigError> {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
    .into()
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("telegram_bot_token", &"<redacted>")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("webhook_url", &self.webhook_url)
            .field("webhook_listen", &self.webhook_listen)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("history_window", &self.history_window)
            .field("context_turns", &self.context_turns)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("persona_path", &self.persona_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        let mut map = config::Map::new();
        for (key, value) in pairs {
            map.insert((*key).to_string(), (*value).to_string());
        }
        map
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![("TELEGRAM_BOT_TOKEN", "123456:ABC-token")]
    }

    #[test]
    fn defaults_apply() {
        let config = RelayConfig::from_vars(vars(&minimal())).expect("should load");
        assert_eq!(config.openai_model, "gpt-4o");
        assert_eq!(config.openai_max_tokens, 2000);
        assert_eq!(config.rate_limit_requests, 10);
        assert_eq!(config.rate_limit_window, 60);
        assert_eq!(config.history_window, 20);
        assert_eq!(config.context_turns, 10);
        assert_eq!(config.provider_timeout(), Duration::from_secs(30));
        assert_eq!(config.session_ttl(), None);
        assert_eq!(config.api_key(), None);
        assert_eq!(config.update_mode().unwrap(), UpdateMode::Polling);
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = RelayConfig::from_vars(vars(&[])).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn placeholder_token_is_fatal() {
        let result = RelayConfig::from_vars(vars(&[("TELEGRAM_BOT_TOKEN", TOKEN_PLACEHOLDER)]));
        assert!(result.is_err());
    }

    #[test]
    fn placeholder_or_empty_api_key_means_no_primary() {
        let mut pairs = minimal();
        pairs.push(("OPENAI_API_KEY", API_KEY_PLACEHOLDER));
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.api_key(), None);

        let mut pairs = minimal();
        pairs.push(("OPENAI_API_KEY", ""));
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.api_key(), None);

        let mut pairs = minimal();
        pairs.push(("OPENAI_API_KEY", "sk-live"));
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.api_key(), Some("sk-live"));
    }

    #[test]
    fn numeric_values_are_parsed() {
        let mut pairs = minimal();
        pairs.extend([
            ("RATE_LIMIT_REQUESTS", "3"),
            ("RATE_LIMIT_WINDOW", "15"),
            ("OPENAI_TEMPERATURE", "1.2"),
            ("SESSION_TTL_SECS", "3600"),
        ]);
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.rate_limit_requests, 3);
        assert_eq!(config.rate_limit_window, 15);
        assert!((config.openai_temperature - 1.2).abs() < f32::EPSILON);
        assert_eq!(config.session_ttl(), Some(chrono::Duration::hours(1)));
    }

    #[test]
    fn out_of_range_tuning_only_warns() {
        let mut pairs = minimal();
        pairs.extend([("OPENAI_MAX_TOKENS", "50"), ("OPENAI_TEMPERATURE", "3.5")]);
        assert!(RelayConfig::from_vars(vars(&pairs)).is_ok());
    }

    #[test]
    fn zero_window_is_fatal() {
        let mut pairs = minimal();
        pairs.push(("RATE_LIMIT_WINDOW", "0"));
        assert!(RelayConfig::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn admin_ids_drop_invalid_entries() {
        let mut pairs = minimal();
        pairs.push(("ADMIN_USER_IDS", "42, abc, 7,,"));
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        let admins = config.admin_ids();
        assert_eq!(admins.len(), 2);
        assert!(admins.contains(&UserId::new(42)));
        assert!(admins.contains(&UserId::new(7)));
    }

    #[test]
    fn single_admin_id_parsed_as_number_still_works() {
        let mut pairs = minimal();
        pairs.push(("ADMIN_USER_IDS", "99"));
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        assert!(config.admin_ids().contains(&UserId::new(99)));
    }

    #[test]
    fn webhook_mode_when_url_set() {
        let mut pairs = minimal();
        pairs.extend([
            ("WEBHOOK_URL", "https://relay.example.com/tg/hook"),
            ("WEBHOOK_SECRET", "s3cret"),
            ("WEBHOOK_LISTEN", "127.0.0.1:9000"),
        ]);
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        match config.update_mode().unwrap() {
            UpdateMode::Webhook {
                path,
                secret,
                listen,
                ..
            } => {
                assert_eq!(path, "/tg/hook");
                assert_eq!(secret.as_deref(), Some("s3cret"));
                assert_eq!(listen.port(), 9000);
            }
            UpdateMode::Polling => panic!("expected webhook mode"),
        }
    }

    #[test]
    fn plain_http_webhook_rejected() {
        let mut pairs = minimal();
        pairs.push(("WEBHOOK_URL", "http://relay.example.com/hook"));
        assert!(RelayConfig::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn context_turns_capped_by_window() {
        let mut pairs = minimal();
        pairs.extend([("HISTORY_WINDOW", "6"), ("CONTEXT_TURNS", "10")]);
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.effective_context_turns(), 6);
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut pairs = minimal();
        pairs.push(("OPENAI_API_KEY", "sk-live"));
        let config = RelayConfig::from_vars(vars(&pairs)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ABC-token"));
        assert!(!rendered.contains("sk-live"));
    }
}
