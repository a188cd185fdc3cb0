//! Long-polling update loop.

use crate::error::RelayError;
use crate::relay::Relay;
use palaver_integration::{TelegramClient, Update};
use rootcause::prelude::Report;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Pause after a failed `getUpdates` call.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Returns the offset acknowledging every update in the batch.
#[must_use]
pub fn next_offset(current: Option<i64>, updates: &[Update]) -> Option<i64> {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .max()
        .max(current)
}

/// Polls for updates until `shutdown` resolves.
///
/// Each update is handled on its own task so users do not wait on each
/// other; the relay serialises turns of the same user. On shutdown the
/// last batch is confirmed to the platform and in-flight turns are allowed
/// to finish before returning.
///
/// # Errors
///
/// Returns an error if a registered webhook cannot be removed.
pub async fn run(
    client: TelegramClient,
    relay: Arc<Relay>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Report<RelayError>> {
    client.delete_webhook().await.map_err(|e| RelayError::Gateway {
        operation: "deleteWebhook",
        reason: e.to_string(),
    })?;
    info!("polling for updates");

    let tasks = TaskTracker::new();
    tokio::pin!(shutdown);
    let mut offset = None;
    loop {
        let batch = tokio::select! {
            () = &mut shutdown => break,
            batch = client.get_updates(offset) => batch,
        };

        match batch {
            Ok(updates) => {
                offset = next_offset(offset, &updates);
                debug!(count = updates.len(), "received updates");
                for update in updates {
                    let relay = Arc::clone(&relay);
                    tasks.spawn(async move {
                        relay.handle_update(update).await;
                    });
                }
            }
            Err(err) => {
                warn!(error = %err, "getUpdates failed, retrying");
                tokio::select! {
                    () = &mut shutdown => break,
                    () = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    if let Some(offset) = offset {
        if let Err(err) = client.acknowledge_updates(offset).await {
            warn!(error = %err, offset, "failed to confirm the last batch, it may be redelivered");
        }
    }
    tasks.close();
    if !tasks.is_empty() {
        info!(in_flight = tasks.len(), "waiting for in-flight turns");
    }
    tasks.wait().await;

    info!("polling stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelaySettings;
    use async_trait::async_trait;
    use palaver_ai::{FallbackProvider, OrchestratorConfig, Persona, ResponseOrchestrator};
    use palaver_conversation::{ConversationStore, StoreConfig};
    use palaver_core::ChatId;
    use palaver_integration::{GatewayError, MessageGateway, RateLimitConfig, RateLimiter, TextFormat};
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn update(id: i64) -> Update {
        Update {
            update_id: id,
            message: None,
        }
    }

    #[test]
    fn offset_moves_past_latest_update() {
        assert_eq!(next_offset(None, &[update(3), update(5), update(4)]), Some(6));
    }

    #[test]
    fn empty_batch_keeps_offset() {
        assert_eq!(next_offset(Some(9), &[]), Some(9));
        assert_eq!(next_offset(None, &[]), None);
    }

    const TOKEN: &str = "123:abc";

    /// Takes a while to deliver, so turns are still running at shutdown.
    #[derive(Default)]
    struct SlowGateway {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageGateway for SlowGateway {
        async fn send_text(&self, _chat: ChatId, text: &str, _format: TextFormat) -> Result<(), GatewayError> {
            tokio::time::sleep(Duration::from_millis(400)).await;
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_typing(&self, _chat: ChatId) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn build_relay(gateway: Arc<SlowGateway>) -> Arc<Relay> {
        let persona = Arc::new(Persona::builtin());
        Arc::new(Relay::new(
            ConversationStore::new(StoreConfig::default()),
            RateLimiter::new(RateLimitConfig::default()),
            ResponseOrchestrator::new(
                None,
                FallbackProvider::new(Arc::clone(&persona)),
                OrchestratorConfig::default(),
            ),
            gateway as Arc<dyn MessageGateway>,
            persona,
            RelaySettings::default(),
        ))
    }

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": result}))
    }

    #[tokio::test]
    async fn shutdown_finishes_turns_and_confirms_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/deleteWebhook")))
            .respond_with(ok(json!(true)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .and(body_partial_json(json!({"timeout": 30})))
            .respond_with(ok(json!([{
                "update_id": 10,
                "message": {
                    "message_id": 1,
                    "from": {"id": 77, "is_bot": false, "first_name": "Ada"},
                    "chat": {"id": 77},
                    "text": "hello"
                }
            }])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .and(body_partial_json(json!({"timeout": 30})))
            .respond_with(ok(json!([])).set_delay(Duration::from_millis(50)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .and(body_partial_json(json!({"offset": 11, "timeout": 0})))
            .respond_with(ok(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = Arc::new(SlowGateway::default());
        let client = TelegramClient::with_api_url(&server.uri(), TOKEN).unwrap();
        let shutdown = tokio::time::sleep(Duration::from_millis(150));

        run(client, build_relay(Arc::clone(&gateway)), shutdown).await.unwrap();

        assert_eq!(gateway.sent.lock().unwrap().len(), 1);
        server.verify().await;
    }
}
