//! The per-message relay pipeline.
//!
//! inbound text → command or rate limit → store user turn → orchestrator →
//! store assistant turn → chunked delivery.

use crate::commands::{self, Command, Inbound};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palaver_ai::{Persona, ReplySource, ResponseOrchestrator};
use palaver_conversation::{ConversationStore, ConversationTurn};
use palaver_core::{ChatId, UserId};
use palaver_integration::{GatewayError, InboundText, MessageGateway, RateLimiter, TextFormat, Update, deliver};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Relay settings not owned by any component.
#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    /// Users allowed to run admin commands.
    pub admins: HashSet<UserId>,
    /// The bot's username, for `/command@username`.
    pub bot_username: Option<String>,
}

/// What handling one message produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A command was answered.
    Command(Command),
    /// The message was refused by the rate limiter.
    RateLimited,
    /// A conversational reply was delivered.
    Replied(ReplySource),
    /// Delivery failed; a generic notice was attempted.
    Failed,
}

/// Turns inbound messages into replies.
pub struct Relay {
    store: ConversationStore,
    limiter: RateLimiter,
    orchestrator: ResponseOrchestrator,
    gateway: Arc<dyn MessageGateway>,
    persona: Arc<Persona>,
    settings: RelaySettings,
    turn_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl Relay {
    /// Creates a relay.
    #[must_use]
    pub fn new(
        store: ConversationStore,
        limiter: RateLimiter,
        orchestrator: ResponseOrchestrator,
        gateway: Arc<dyn MessageGateway>,
        persona: Arc<Persona>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store,
            limiter,
            orchestrator,
            gateway,
            persona,
            settings,
            turn_locks: DashMap::new(),
        }
    }

    /// Returns the conversation store.
    #[must_use]
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Returns the orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &ResponseOrchestrator {
        &self.orchestrator
    }

    /// Handles a raw platform update. Non-text updates are ignored.
    pub async fn handle_update(&self, update: Update) -> Option<Outcome> {
        let update_id = update.update_id;
        let Some(inbound) = update.into_inbound() else {
            debug!(update_id, "ignoring non-text update");
            return None;
        };
        Some(self.handle_text(inbound).await)
    }

    /// Handles one text message and answers it exactly once.
    #[instrument(skip_all, fields(user_id = %inbound.user_id, chat_id = %inbound.chat_id))]
    pub async fn handle_text(&self, inbound: InboundText) -> Outcome {
        let lock = self.turn_lock(inbound.user_id);
        let _turn = lock.lock().await;

        match self.process(&inbound).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "failed to answer message");
                if let Err(err) = self
                    .gateway
                    .send_text(inbound.chat_id, &self.persona.unexpected_error, TextFormat::Plain)
                    .await
                {
                    warn!(error = %err, "failed to send error notice");
                }
                Outcome::Failed
            }
        }
    }

    async fn process(&self, inbound: &InboundText) -> Result<Outcome, GatewayError> {
        let text = match commands::parse(&inbound.text, self.settings.bot_username.as_deref()) {
            Inbound::Command(command) if !command.admin_only() || self.is_admin(inbound.user_id) => {
                self.run_command(command, inbound).await?;
                return Ok(Outcome::Command(command));
            }
            Inbound::Command(_) | Inbound::Text(_) => inbound.text.as_str(),
        };
        self.converse(inbound.user_id, inbound.chat_id, text).await
    }

    async fn converse(&self, user: UserId, chat: ChatId, text: &str) -> Result<Outcome, GatewayError> {
        let admission = self.limiter.check_and_increment(user);
        if !admission.is_allowed() {
            info!(retry_after = ?admission.retry_after(), "rate limit exceeded");
            self.gateway
                .send_text(chat, &self.persona.rate_limited, TextFormat::Plain)
                .await?;
            return Ok(Outcome::RateLimited);
        }

        if let Err(err) = self.gateway.send_typing(chat).await {
            debug!(error = %err, "typing indicator not sent");
        }

        let history = self.store.append(user, ConversationTurn::user(text));
        let reply = self.orchestrator.get_response(&history).await;
        if reply.source != ReplySource::ServiceUnavailable {
            self.store.append(user, ConversationTurn::assistant(reply.text.clone()));
        }

        let chunks = deliver(self.gateway.as_ref(), chat, &reply.text).await?;
        info!(source = %reply.source, chunks, "processed message");
        Ok(Outcome::Replied(reply.source))
    }

    async fn run_command(&self, command: Command, inbound: &InboundText) -> Result<(), GatewayError> {
        let user = inbound.user_id;
        let text = match command {
            Command::Start => {
                self.store.clear(user);
                let name = match inbound.first_name.trim() {
                    "" => "friend",
                    name => name,
                };
                info!("conversation started");
                self.persona.render_welcome(name)
            }
            Command::Clear => {
                self.store.clear(user);
                info!("conversation cleared");
                self.persona.cleared.clone()
            }
            Command::Help => self.persona.help.clone(),
            Command::Status => self.status_text(user),
            Command::Probe => {
                let answered = self.orchestrator.probe().await;
                info!(answered, "admin probe");
                format!(
                    "Primary provider {}. Serving from: {}.",
                    if answered { "answered" } else { "did not answer" },
                    self.orchestrator.state()
                )
            }
        };
        deliver(self.gateway.as_ref(), inbound.chat_id, &text).await?;
        Ok(())
    }

    fn status_text(&self, user: UserId) -> String {
        let turns = self.store.get(user).len();
        let time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let mut text = self.persona.render_status(turns, &time);
        if self.is_admin(user) {
            text.push_str(&format!(
                "\n\nProvider: {}\nActive sessions: {}",
                self.orchestrator.state(),
                self.store.session_count()
            ));
        }
        text
    }

    fn is_admin(&self, user: UserId) -> bool {
        self.settings.admins.contains(&user)
    }

    fn turn_lock(&self, user: UserId) -> Arc<Mutex<()>> {
        Arc::clone(self.turn_locks.entry(user).or_default().value())
    }

    /// Drops expired sessions, finished rate windows and turn locks nobody
    /// holds.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Sweeps as of `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let purged = self.store.purge_expired_at(now);
        let windows = self.limiter.purge_stale_at(now);
        self.turn_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        if purged > 0 || windows > 0 {
            debug!(purged, windows, "swept idle state");
        }
        purged
    }
}
