use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use carlos_chat::{BotIdentity, ChatPlatform};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    platform: Arc<dyn ChatPlatform>,
    bot: BotIdentity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub chat_platform: HealthCheck,
    pub bot_user_id: String,
    pub checked_at: String,
}

pub fn router(platform: Arc<dyn ChatPlatform>, bot: BotIdentity) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { platform, bot })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    platform: Arc<dyn ChatPlatform>,
    bot: BotIdentity,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(event_name = "system.health.start", bind_address = %address, "health endpoint started");

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(platform, bot)).await {
            error!(
                event_name = "system.health.error",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let chat_platform = match state.platform.ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: "chat platform reachable".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("chat platform ping failed: {error}") }
        }
    };
    let ready = chat_platform.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "rent-a-carlos webhook runtime initialized".to_string() },
        chat_platform,
        bot_user_id: state.bot.user_id.clone(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use carlos_chat::memory::PlatformOperation;
    use carlos_chat::{BotIdentity, InMemoryChatPlatform};

    use crate::health::{health, HealthState};

    fn state(platform: Arc<InMemoryChatPlatform>) -> HealthState {
        HealthState { platform, bot: BotIdentity::new("BOT", "carlos") }
    }

    #[tokio::test]
    async fn health_returns_ready_when_chat_platform_answers() {
        let (status, Json(payload)) = health(State(state(Arc::new(InMemoryChatPlatform::new())))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.chat_platform.status, "ready");
        assert_eq!(payload.bot_user_id, "BOT");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_ping_fails() {
        let platform = Arc::new(InMemoryChatPlatform::new());
        platform.fail(PlatformOperation::Ping);

        let (status, Json(payload)) = health(State(state(platform))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.chat_platform.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
