use std::sync::Arc;
use std::time::Duration;

use carlos_chat::workflow::CallbackUrlError;
use carlos_chat::{
    BotIdentity, CallbackUrls, ChatPlatform, CommandDispatcher, InteractiveDialogLauncher,
    MattermostClient, PlatformError, RequestWorkflow, TaskStateHandler,
};
use carlos_core::config::{AppConfig, ConfigError, WebhookConfig};
use carlos_core::RequestLedger;
use thiserror::Error;
use tracing::info;

use crate::webhook::WebhookState;

pub struct Application {
    pub config: AppConfig,
    pub platform: Arc<dyn ChatPlatform>,
    pub bot: BotIdentity,
    pub webhook: WebhookState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("chat client could not be created: {0}")]
    ChatClient(#[source] PlatformError),
    #[error("bot identity could not be resolved from chat.bot_token: {0}")]
    BotIdentity(#[source] PlatformError),
    #[error(transparent)]
    CallbackUrl(#[from] CallbackUrlError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        chat_base_url = %config.chat.base_url,
        public_url = %config.webhook.public_url,
        "starting application bootstrap"
    );

    let client = MattermostClient::new(
        &config.chat.base_url,
        config.chat.bot_token.clone(),
        Duration::from_secs(config.chat.timeout_secs),
    )
    .map_err(BootstrapError::ChatClient)?;

    let bot = client.current_user().await.map_err(BootstrapError::BotIdentity)?;
    info!(
        event_name = "system.bootstrap.bot_resolved",
        bot_user_id = %bot.user_id,
        bot_username = %bot.username,
        "bot identity resolved"
    );

    let platform: Arc<dyn ChatPlatform> = Arc::new(client);
    let webhook = build_webhook_state(platform.clone(), bot.clone(), &config.webhook)?;

    Ok(Application { config, platform, bot, webhook })
}

/// Wires the request handlers around one platform, bot and ledger.
pub fn build_webhook_state(
    platform: Arc<dyn ChatPlatform>,
    bot: BotIdentity,
    webhook: &WebhookConfig,
) -> Result<WebhookState, BootstrapError> {
    let callbacks = CallbackUrls::new(&webhook.public_url, &webhook.token)?;
    let ledger = Arc::new(RequestLedger::new());

    let workflow =
        Arc::new(RequestWorkflow::new(platform.clone(), bot.clone(), callbacks, ledger.clone()));
    let dialogs = Arc::new(InteractiveDialogLauncher::new(workflow.clone()));
    let commands =
        Arc::new(CommandDispatcher::new(webhook.command_trigger.clone(), workflow, dialogs.clone()));
    let tasks = Arc::new(TaskStateHandler::new(platform, bot, ledger));

    Ok(WebhookState::new(webhook.token.clone(), tasks, dialogs, commands))
}
