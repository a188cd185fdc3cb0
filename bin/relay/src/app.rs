//! Startup wiring: builds the relay from configuration and runs the
//! selected update loop until shutdown.

use crate::commands;
use crate::config::{RelayConfig, UpdateMode};
use crate::error::RelayError;
use crate::relay::{Relay, RelaySettings};
use crate::{polling, webhook};
use palaver_ai::{
    FallbackProvider, LlmBackendConfig, OpenAiBackend, OrchestratorConfig, Persona, PrimaryProvider,
    PrimarySettings, ResponseOrchestrator, ResponseProvider,
};
use palaver_conversation::{ConversationStore, StoreConfig};
use palaver_core::Result;
use palaver_integration::{MessageGateway, RateLimitConfig, RateLimiter, TelegramClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// How often expired sessions and idle locks are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Loads the configured persona, or the built-in one.
///
/// # Errors
///
/// Returns an error if a persona file is configured but unusable.
pub fn load_persona(config: &RelayConfig) -> Result<Persona, RelayError> {
    match &config.persona_path {
        Some(path) => {
            let persona = Persona::from_json_file(path).map_err(|e| RelayError::Persona {
                reason: e.to_string(),
            })?;
            info!(persona = %persona.name, path = %path.display(), "persona loaded");
            Ok(persona)
        }
        None => Ok(Persona::builtin()),
    }
}

/// Builds the primary provider, or `None` if the relay must run degraded.
#[must_use]
pub fn build_primary(config: &RelayConfig, persona: &Persona) -> Option<Arc<dyn ResponseProvider>> {
    let Some(key) = config.api_key() else {
        warn!("no usable OPENAI_API_KEY, serving from the fallback persona only");
        return None;
    };
    let backend_config = LlmBackendConfig::openai(key, &config.openai_model)
        .with_base_url(&config.openai_base_url)
        .with_request_timeout(config.provider_timeout());
    let backend = match OpenAiBackend::new(backend_config) {
        Ok(backend) => backend,
        Err(err) => {
            warn!(error = %err, "remote model backend unavailable, serving from the fallback persona only");
            return None;
        }
    };
    let settings = PrimarySettings {
        context_turns: config.effective_context_turns(),
        max_tokens: config.openai_max_tokens,
        temperature: config.openai_temperature,
        timeout: config.provider_timeout(),
    };
    Some(Arc::new(PrimaryProvider::new(
        Arc::new(backend),
        persona.system_prompt.clone(),
        settings,
    )))
}

/// Assembles the relay around a gateway.
///
/// # Errors
///
/// Returns an error if the persona cannot be loaded.
pub fn build_relay(config: &RelayConfig, gateway: Arc<dyn MessageGateway>) -> Result<Relay, RelayError> {
    let persona = Arc::new(load_persona(config)?);
    let orchestrator = ResponseOrchestrator::new(
        build_primary(config, &persona),
        FallbackProvider::new(Arc::clone(&persona)),
        OrchestratorConfig::default(),
    );
    let store = ConversationStore::new(StoreConfig {
        window: config.history_window,
        ttl: config.session_ttl(),
    });
    let limiter = RateLimiter::new(RateLimitConfig::new(
        config.rate_limit_requests,
        config.rate_limit_window,
    ));
    let settings = RelaySettings {
        admins: config.admin_ids(),
        bot_username: config.bot_username.clone(),
    };
    Ok(Relay::new(store, limiter, orchestrator, gateway, persona, settings))
}

/// Runs the relay until ctrl-c.
///
/// # Errors
///
/// Returns an error if startup fails or the webhook server stops with an
/// error.
pub async fn run(config: RelayConfig) -> Result<(), RelayError> {
    let mode = config.update_mode().map_err(|e| RelayError::Config {
        reason: e.to_string(),
    })?;
    let client = TelegramClient::new(&config.telegram_bot_token).map_err(|e| RelayError::Gateway {
        operation: "connect",
        reason: e.to_string(),
    })?;

    match client.get_me().await {
        Ok(me) => info!(bot_id = %me.id, username = ?me.username, "connected to Telegram"),
        Err(err) => warn!(error = %err, "getMe failed, continuing"),
    }
    if let Err(err) = client.set_my_commands(&commands::menu()).await {
        warn!(error = %err, "failed to register the command menu");
    }

    let relay = Arc::new(build_relay(&config, Arc::new(client.clone()))?);
    spawn_sweeper(Arc::clone(&relay));

    match mode {
        UpdateMode::Webhook {
            url,
            path,
            secret,
            listen,
        } => {
            client
                .set_webhook(url.as_str(), secret.as_deref())
                .await
                .map_err(|e| RelayError::Gateway {
                    operation: "setWebhook",
                    reason: e.to_string(),
                })?;
            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .map_err(|e| RelayError::Bind {
                    addr: listen.to_string(),
                    reason: e.to_string(),
                })?;
            info!(%listen, %path, "webhook listening");
            let tasks = TaskTracker::new();
            let served = axum::serve(listener, webhook::router(relay, &path, secret, tasks.clone()))
                .with_graceful_shutdown(shutdown_signal())
                .await;
            tasks.close();
            if !tasks.is_empty() {
                info!(in_flight = tasks.len(), "waiting for in-flight turns");
            }
            tasks.wait().await;
            served.map_err(|e| RelayError::Server {
                reason: e.to_string(),
            })?;
            info!("webhook server stopped");
            Ok(())
        }
        UpdateMode::Polling => polling::run(client, relay, shutdown_signal()).await,
    }
}

fn spawn_sweeper(relay: Arc<Relay>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            relay.sweep();
        }
    });
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => warn!(error = %err, "cannot listen for ctrl-c, shutting down"),
    }
}
