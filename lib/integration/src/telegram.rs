//! Thin client for the Telegram Bot HTTP API.
//!
//! Only the methods the relay needs are wrapped. Every call is a JSON POST
//! to `{api_url}/bot{token}/{method}` answered by an `{ok, result}` envelope.

use crate::error::GatewayError;
use crate::gateway::{MessageGateway, TextFormat};
use async_trait::async_trait;
use palaver_core::{ChatId, UserId};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Seconds a `getUpdates` long poll may wait for new updates.
pub const LONG_POLL_SECS: u32 = 30;

/// An incoming update. Only text messages are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Sender>,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// The user who sent a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// The chat a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

/// A text message from a human, ready for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundText {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub first_name: String,
    pub text: String,
}

impl Update {
    /// Extracts the text message, skipping non-text updates and bots.
    #[must_use]
    pub fn into_inbound(self) -> Option<InboundText> {
        let message = self.message?;
        let sender = message.from?;
        if sender.is_bot {
            return None;
        }
        let text = message.text?;
        Some(InboundText {
            user_id: sender.id,
            chat_id: message.chat.id,
            first_name: sender.first_name,
            text,
        })
    }
}

/// An entry of the bot's command menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    /// Creates a menu entry.
    #[must_use]
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u32,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Serialize)]
struct SendChatAction {
    chat_id: ChatId,
    action: &'static str,
}

#[derive(Serialize)]
struct SetMyCommands<'a> {
    commands: &'a [BotCommand],
}

#[derive(Serialize)]
struct SetWebhook<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct DeleteWebhook {
    drop_pending_updates: bool,
}

#[derive(Serialize)]
struct NoParams {}

/// Decodes a Bot API response envelope.
///
/// # Errors
///
/// Returns `Api` for `ok: false` and `Decode` for anything unreadable.
pub fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, GatewayError> {
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| GatewayError::Decode {
        reason: format!("status {status}: {e}"),
    })?;
    if !envelope.ok {
        return Err(GatewayError::Api {
            code: envelope.error_code.unwrap_or(status),
            description: envelope.description.unwrap_or_else(|| "no description".to_string()),
        });
    }
    envelope.result.ok_or_else(|| GatewayError::Decode {
        reason: "missing result".to_string(),
    })
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
}

impl TelegramClient {
    /// Creates a client for the public Bot API.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the token is empty or the HTTP client
    /// cannot be built.
    pub fn new(token: &str) -> Result<Self, GatewayError> {
        Self::with_api_url(DEFAULT_API_URL, token)
    }

    /// Creates a client against a custom Bot API server.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the token is empty or the HTTP client
    /// cannot be built.
    pub fn with_api_url(api_url: &str, token: &str) -> Result<Self, GatewayError> {
        if token.trim().is_empty() {
            return Err(GatewayError::InvalidConfig {
                reason: "bot token is empty".to_string(),
            });
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(LONG_POLL_SECS) + 15))
            .build()
            .map_err(|e| GatewayError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token.trim()),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, GatewayError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{method}", self.base))
            .json(params)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                reason: e.without_url().to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| GatewayError::Transport {
            reason: e.without_url().to_string(),
        })?;
        debug!(method, status, "bot api call");
        decode_envelope(status, &body)
    }

    /// Returns the bot's own account.
    pub async fn get_me(&self) -> Result<Sender, GatewayError> {
        self.call("getMe", &NoParams {}).await
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, GatewayError> {
        let params = GetUpdates {
            offset,
            timeout: LONG_POLL_SECS,
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &params).await
    }

    /// Confirms every update before `offset` without waiting for new ones.
    ///
    /// Telegram only forgets a batch once a later `getUpdates` carries an
    /// offset past it, so this is the last call before polling stops.
    pub async fn acknowledge_updates(&self, offset: i64) -> Result<(), GatewayError> {
        let params = GetUpdates {
            offset: Some(offset),
            timeout: 0,
            allowed_updates: ["message"],
        };
        let _: Vec<Update> = self.call("getUpdates", &params).await?;
        Ok(())
    }

    /// Sends a text message.
    pub async fn send_message(&self, chat: ChatId, text: &str, format: TextFormat) -> Result<(), GatewayError> {
        let params = SendMessage {
            chat_id: chat,
            text,
            parse_mode: match format {
                TextFormat::Markdown => Some("Markdown"),
                TextFormat::Plain => None,
            },
        };
        let _: serde_json::Value = self.call("sendMessage", &params).await?;
        Ok(())
    }

    /// Sends the "typing" chat action.
    pub async fn send_chat_action(&self, chat: ChatId) -> Result<(), GatewayError> {
        let params = SendChatAction {
            chat_id: chat,
            action: "typing",
        };
        let _: bool = self.call("sendChatAction", &params).await?;
        Ok(())
    }

    /// Replaces the bot's command menu.
    pub async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), GatewayError> {
        let _: bool = self.call("setMyCommands", &SetMyCommands { commands }).await?;
        Ok(())
    }

    /// Registers a webhook, optionally with a secret echoed in every delivery.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), GatewayError> {
        let params = SetWebhook {
            url,
            secret_token: secret,
            allowed_updates: ["message"],
        };
        let _: bool = self.call("setWebhook", &params).await?;
        Ok(())
    }

    /// Removes any registered webhook so long polling can be used.
    pub async fn delete_webhook(&self) -> Result<(), GatewayError> {
        let params = DeleteWebhook {
            drop_pending_updates: false,
        };
        let _: bool = self.call("deleteWebhook", &params).await?;
        Ok(())
    }
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageGateway for TelegramClient {
    async fn send_text(&self, chat: ChatId, text: &str, format: TextFormat) -> Result<(), GatewayError> {
        self.send_message(chat, text, format).await
    }

    async fn send_typing(&self, chat: ChatId) -> Result<(), GatewayError> {
        self.send_chat_action(chat).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123:abc";

    fn update_json() -> serde_json::Value {
        json!({
            "update_id": 900,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "chat": {"id": -1001, "type": "private"},
                "date": 1700000000,
                "text": "hello"
            }
        })
    }

    #[test]
    fn parses_text_update() {
        let update: Update = serde_json::from_value(update_json()).unwrap();
        let inbound = update.into_inbound().unwrap();
        assert_eq!(inbound.user_id, UserId::new(42));
        assert_eq!(inbound.chat_id, ChatId::new(-1001));
        assert_eq!(inbound.first_name, "Ada");
        assert_eq!(inbound.text, "hello");
    }

    #[test]
    fn skips_non_text_and_bot_updates() {
        let sticker: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {"message_id": 1, "from": {"id": 1, "first_name": "A"}, "chat": {"id": 1}}
        }))
        .unwrap();
        assert!(sticker.into_inbound().is_none());

        let bot: Update = serde_json::from_value(json!({
            "update_id": 2,
            "message": {"message_id": 2, "from": {"id": 2, "is_bot": true, "first_name": "B"},
                        "chat": {"id": 2}, "text": "hi"}
        }))
        .unwrap();
        assert!(bot.into_inbound().is_none());

        let edited: Update = serde_json::from_value(json!({"update_id": 3})).unwrap();
        assert!(edited.into_inbound().is_none());
    }

    #[test]
    fn envelope_error_is_api_error() {
        let err = decode_envelope::<bool>(400, r#"{"ok":false,"error_code":400,"description":"Bad Request"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Api {
                code: 400,
                description: "Bad Request".to_string()
            }
        );
    }

    #[test]
    fn envelope_without_result_is_decode_error() {
        let err = decode_envelope::<Vec<Update>>(200, r#"{"ok":true}"#).unwrap_err();
        assert_eq!(
            err,
            GatewayError::Decode {
                reason: "missing result".to_string()
            }
        );
    }

    #[test]
    fn envelope_result_is_returned() {
        let updates = decode_envelope::<Vec<Update>>(200, r#"{"ok":true,"result":[{"update_id":4}]}"#).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 4);
    }

    #[test]
    fn envelope_garbage_is_decode_error() {
        let err = decode_envelope::<bool>(502, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
    }

    #[test]
    fn empty_token_rejected() {
        assert!(matches!(
            TelegramClient::new("  "),
            Err(GatewayError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn debug_hides_token() {
        let client = TelegramClient::new(TOKEN).unwrap();
        assert!(!format!("{client:?}").contains("abc"));
    }

    #[tokio::test]
    async fn send_message_posts_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_partial_json(json!({"chat_id": 7, "text": "hi", "parse_mode": "Markdown"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 1}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::with_api_url(&server.uri(), TOKEN).unwrap();
        client.send_message(ChatId::new(7), "hi", TextFormat::Markdown).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_message_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities"
            })))
            .mount(&server)
            .await;

        let client = TelegramClient::with_api_url(&server.uri(), TOKEN).unwrap();
        let err = client
            .send_message(ChatId::new(7), "*oops", TextFormat::Markdown)
            .await
            .unwrap_err();
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn get_updates_returns_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .and(body_partial_json(json!({"offset": 900})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": [update_json()]})))
            .mount(&server)
            .await;

        let client = TelegramClient::with_api_url(&server.uri(), TOKEN).unwrap();
        let updates = client.get_updates(Some(900)).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 900);
    }

    #[tokio::test]
    async fn webhook_registration_carries_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/setWebhook")))
            .and(body_partial_json(json!({"url": "https://relay.example/hook", "secret_token": "s3"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::with_api_url(&server.uri(), TOKEN).unwrap();
        client
            .set_webhook("https://relay.example/hook", Some("s3"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn acknowledging_updates_does_not_wait() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .and(body_partial_json(json!({"offset": 901, "timeout": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::with_api_url(&server.uri(), TOKEN).unwrap();
        client.acknowledge_updates(901).await.unwrap();
    }
}
