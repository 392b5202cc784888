use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Channel, ChatUser, OpenDialogRequest, Post};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("chat platform request failed: {0}")]
    Transport(String),
    #[error("chat platform returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("chat platform resource not found: {0}")]
    NotFound(String),
    #[error("chat platform response could not be decoded: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The bot account every request is posted from. Resolved once at startup
/// and handed to the handlers that need it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub username: String,
}

impl BotIdentity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), username: username.into() }
    }
}

/// Everything the request handlers need from the chat server.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn ping(&self) -> Result<(), PlatformError>;

    async fn get_user(&self, user_id: &str) -> Result<ChatUser, PlatformError>;

    async fn get_user_by_username(&self, username: &str) -> Result<ChatUser, PlatformError>;

    async fn get_direct_channel(
        &self,
        first_user_id: &str,
        second_user_id: &str,
    ) -> Result<Channel, PlatformError>;

    async fn create_post(&self, post: Post) -> Result<Post, PlatformError>;

    async fn get_post(&self, post_id: &str) -> Result<Post, PlatformError>;

    async fn update_post(&self, post: Post) -> Result<Post, PlatformError>;

    async fn delete_post(&self, post_id: &str) -> Result<(), PlatformError>;

    /// `post.channel_id` must name the channel the recipient is looking at.
    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<(), PlatformError>;

    async fn open_interactive_dialog(&self, request: OpenDialogRequest)
        -> Result<(), PlatformError>;
}

/// Posts `post` from the bot into its direct channel with `recipient_id`.
pub async fn send_direct_message(
    platform: &dyn ChatPlatform,
    bot: &BotIdentity,
    recipient_id: &str,
    mut post: Post,
) -> Result<Post, PlatformError> {
    let channel = platform.get_direct_channel(&bot.user_id, recipient_id).await?;
    post.channel_id = channel.id;
    post.user_id = bot.user_id.clone();
    platform.create_post(post).await
}
