//! Webhook endpoint for pushed updates.
//!
//! A delivery is acknowledged as soon as it is accepted. The turn itself
//! runs on a tracked task that shutdown waits for.

use crate::relay::Relay;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use palaver_integration::Update;
use serde_json::json;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Header carrying the secret registered with `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct WebhookState {
    relay: Arc<Relay>,
    secret: Option<Arc<str>>,
    tasks: TaskTracker,
}

/// Builds the webhook router: updates on `path`, liveness on `/health`.
///
/// Turns run on `tasks`; close and wait on it after the server stops.
pub fn router(relay: Arc<Relay>, path: &str, secret: Option<String>, tasks: TaskTracker) -> Router {
    let state = WebhookState {
        relay,
        secret: secret.map(Arc::from),
        tasks,
    };
    Router::new()
        .route(path, post(receive_update))
        .route("/health", get(health))
        .with_state(state)
}

async fn receive_update(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(expected) = state.secret.as_deref() {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            warn!("webhook call with bad secret rejected");
            return StatusCode::UNAUTHORIZED;
        }
    }

    // Acknowledged anyway, or it would be redelivered.
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(err) => {
            warn!(error = %err, "dropping unreadable update");
            return StatusCode::OK;
        }
    };
    debug!(update_id = update.update_id, "update accepted");
    let relay = Arc::clone(&state.relay);
    state.tasks.spawn(async move {
        relay.handle_update(update).await;
    });
    StatusCode::OK
}

async fn health(State(state): State<WebhookState>) -> impl IntoResponse {
    let orchestrator = state.relay.orchestrator();
    let healthy = orchestrator.is_healthy().await;
    Json(json!({
        "healthy": healthy,
        "provider": orchestrator.state(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelaySettings;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use palaver_ai::{FallbackProvider, OrchestratorConfig, Persona, ResponseOrchestrator};
    use palaver_conversation::{ConversationStore, StoreConfig};
    use palaver_core::ChatId;
    use palaver_integration::{GatewayError, MessageGateway, RateLimitConfig, RateLimiter, TextFormat};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<String>>,
        hold: Option<Semaphore>,
    }

    impl RecordingGateway {
        fn held() -> Self {
            Self {
                sent: Mutex::default(),
                hold: Some(Semaphore::new(0)),
            }
        }

        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageGateway for RecordingGateway {
        async fn send_text(&self, _chat: ChatId, text: &str, _format: TextFormat) -> Result<(), GatewayError> {
            if let Some(hold) = &self.hold {
                hold.acquire().await.unwrap().forget();
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_typing(&self, _chat: ChatId) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    struct App {
        router: Router,
        gateway: Arc<RecordingGateway>,
        tasks: TaskTracker,
    }

    impl App {
        async fn drain(&self) {
            self.tasks.close();
            self.tasks.wait().await;
        }
    }

    fn app_with(secret: Option<&str>, gateway: RecordingGateway) -> App {
        let gateway = Arc::new(gateway);
        let persona = Arc::new(Persona::builtin());
        let relay = Relay::new(
            ConversationStore::new(StoreConfig::default()),
            RateLimiter::new(RateLimitConfig::default()),
            ResponseOrchestrator::new(
                None,
                FallbackProvider::new(Arc::clone(&persona)),
                OrchestratorConfig::default(),
            ),
            Arc::clone(&gateway) as Arc<dyn MessageGateway>,
            persona,
            RelaySettings::default(),
        );
        let tasks = TaskTracker::new();
        App {
            router: router(Arc::new(relay), "/hook", secret.map(str::to_string), tasks.clone()),
            gateway,
            tasks,
        }
    }

    fn app(secret: Option<&str>) -> App {
        app_with(secret, RecordingGateway::default())
    }

    fn post(secret: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/hook")
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_HEADER, secret);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn update_request(secret: Option<&str>) -> Request<Body> {
        let body = json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": {"id": 77, "is_bot": false, "first_name": "Ada"},
                "chat": {"id": 77},
                "text": "hello"
            }
        });
        post(secret, body.to_string())
    }

    #[tokio::test]
    async fn accepted_update_is_answered() {
        let app = app(Some("s3"));
        let response = app.router.clone().oneshot(update_request(Some("s3"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        app.drain().await;
        assert_eq!(app.gateway.sent(), 1);
    }

    #[tokio::test]
    async fn acknowledges_before_the_turn_finishes() {
        let app = app_with(None, RecordingGateway::held());
        for _ in 0..3 {
            let response = app.router.clone().oneshot(update_request(None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(app.gateway.sent(), 0);

        app.gateway.hold.as_ref().unwrap().add_permits(3);
        app.drain().await;
        assert_eq!(app.gateway.sent(), 3);
    }

    #[tokio::test]
    async fn unreadable_update_is_acknowledged() {
        let app = app(None);
        let response = app.router.clone().oneshot(post(None, "{not json".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(post(None, json!({"message": "no id"}).to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        app.drain().await;
        assert_eq!(app.gateway.sent(), 0);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let app = app(Some("s3"));
        let response = app.router.clone().oneshot(update_request(Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        app.drain().await;
        assert_eq!(app.gateway.sent(), 0);
    }

    #[tokio::test]
    async fn missing_secret_is_rejected() {
        let app = app(Some("s3"));
        let response = app.router.clone().oneshot(update_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn no_secret_configured_accepts_all() {
        let app = app(None);
        let response = app.router.clone().oneshot(update_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        app.drain().await;
        assert_eq!(app.gateway.sent(), 1);
    }

    #[tokio::test]
    async fn health_reports_provider_state() {
        let app = app(None);
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["healthy"], true);
        assert_eq!(body["provider"], "degraded");
    }
}
