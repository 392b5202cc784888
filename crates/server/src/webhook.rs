use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use carlos_chat::model::{CommandResponse, EphemeralResponse};
use carlos_chat::{CommandDispatcher, InteractiveDialogLauncher, SlashCommand, TaskStateHandler};
use carlos_core::RequestAction;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or missing token";

#[derive(Clone)]
pub struct WebhookState {
    token: Arc<SecretString>,
    tasks: Arc<TaskStateHandler>,
    dialogs: Arc<InteractiveDialogLauncher>,
    commands: Arc<CommandDispatcher>,
}

impl WebhookState {
    pub fn new(
        token: SecretString,
        tasks: Arc<TaskStateHandler>,
        dialogs: Arc<InteractiveDialogLauncher>,
        commands: Arc<CommandDispatcher>,
    ) -> Self {
        Self { token: Arc::new(token), tasks, dialogs, commands }
    }

    fn token_matches(&self, supplied: &str) -> bool {
        let expected = self.token.expose_secret();
        !expected.is_empty() && bool::from(supplied.as_bytes().ct_eq(expected.as_bytes()))
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Every path, known or not, is behind the shared token.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/api/complete", post(complete))
        .route("/api/reject", post(reject))
        .route("/api/dialog", post(dialog))
        .route("/api/command", post(command))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

async fn require_token(State(state): State<WebhookState>, request: Request, next: Next) -> Response {
    let supplied =
        Query::<TokenQuery>::try_from_uri(request.uri()).ok().and_then(|Query(query)| query.token);

    match supplied {
        Some(token) if state.token_matches(&token) => next.run(request).await,
        supplied => {
            warn!(
                event_name = "webhook.token.rejected",
                path = %request.uri().path(),
                token_present = supplied.is_some(),
                "rejected callback with invalid token"
            );
            (StatusCode::BAD_REQUEST, INVALID_TOKEN_MESSAGE).into_response()
        }
    }
}

async fn complete(State(state): State<WebhookState>, body: Bytes) -> Json<EphemeralResponse> {
    info!(event_name = "webhook.complete.received", "received complete callback");
    Json(state.tasks.handle(RequestAction::Complete, &body).await)
}

async fn reject(State(state): State<WebhookState>, body: Bytes) -> Json<EphemeralResponse> {
    info!(event_name = "webhook.reject.received", "received reject callback");
    Json(state.tasks.handle(RequestAction::Reject, &body).await)
}

async fn dialog(State(state): State<WebhookState>, body: Bytes) -> Response {
    info!(event_name = "webhook.dialog.received", "received dialog submission");
    let response = state.dialogs.handle_submission(&body).await;
    match response.error {
        None => StatusCode::OK.into_response(),
        Some(_) => Json(response).into_response(),
    }
}

async fn command(
    State(state): State<WebhookState>,
    Form(invocation): Form<SlashCommand>,
) -> Json<CommandResponse> {
    Json(state.commands.execute(&invocation).await)
}

async fn not_found(request: Request) -> StatusCode {
    warn!(event_name = "webhook.route.unknown", path = %request.uri().path(), "unknown path");
    StatusCode::NOT_FOUND
}
