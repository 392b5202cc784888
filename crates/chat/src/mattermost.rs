use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Channel, ChatUser, OpenDialogRequest, Post};
use crate::platform::{BotIdentity, ChatPlatform, PlatformError};

const API_PREFIX: &str = "/api/v4";

/// Mattermost REST API v4 adapter authenticated with a bot access token.
#[derive(Clone)]
pub struct MattermostClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
}

#[derive(Serialize)]
struct EphemeralPostRequest<'a> {
    user_id: &'a str,
    post: &'a Post,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl MattermostClient {
    pub fn new(
        base_url: &str,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static("rent-a-carlos"));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|error| PlatformError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            api_base: format!("{}{API_PREFIX}", base_url.trim_end_matches('/')),
            bot_token,
        })
    }

    /// Identity of the account the token belongs to.
    pub async fn current_user(&self) -> Result<BotIdentity, PlatformError> {
        let user: ChatUser = self.send_json(self.request(Method::GET, "/users/me")).await?;
        Ok(BotIdentity::new(user.id, user.username))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .bearer_auth(self.bot_token.expose_secret())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, PlatformError> {
        let response =
            builder.send().await.map_err(|error| PlatformError::Transport(error.to_string()))?;
        let status = response.status();
        debug!(
            event_name = "chat.api.response",
            status = status.as_u16(),
            url = %response.url().path(),
            "chat platform responded"
        );
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_owned();
        let message = response
            .json::<ApiErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(if message.is_empty() { url } else { message }));
        }
        Err(PlatformError::Status { status: status.as_u16(), message })
    }

    async fn send_json<T>(&self, builder: RequestBuilder) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
    {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|error| PlatformError::Decode(error.to_string()))
    }
}

#[async_trait]
impl ChatPlatform for MattermostClient {
    async fn ping(&self) -> Result<(), PlatformError> {
        self.send(self.request(Method::GET, "/system/ping")).await.map(|_| ())
    }

    async fn get_user(&self, user_id: &str) -> Result<ChatUser, PlatformError> {
        self.send_json(self.request(Method::GET, &format!("/users/{user_id}"))).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<ChatUser, PlatformError> {
        self.send_json(self.request(Method::GET, &format!("/users/username/{username}"))).await
    }

    async fn get_direct_channel(
        &self,
        first_user_id: &str,
        second_user_id: &str,
    ) -> Result<Channel, PlatformError> {
        let members = [first_user_id, second_user_id];
        self.send_json(self.request(Method::POST, "/channels/direct").json(&members)).await
    }

    async fn create_post(&self, post: Post) -> Result<Post, PlatformError> {
        self.send_json(self.request(Method::POST, "/posts").json(&post)).await
    }

    async fn get_post(&self, post_id: &str) -> Result<Post, PlatformError> {
        self.send_json(self.request(Method::GET, &format!("/posts/{post_id}"))).await
    }

    async fn update_post(&self, post: Post) -> Result<Post, PlatformError> {
        let path = format!("/posts/{}", post.id);
        self.send_json(self.request(Method::PUT, &path).json(&post)).await
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), PlatformError> {
        self.send(self.request(Method::DELETE, &format!("/posts/{post_id}"))).await.map(|_| ())
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<(), PlatformError> {
        let body = EphemeralPostRequest { user_id, post: &post };
        self.send(self.request(Method::POST, "/posts/ephemeral").json(&body)).await.map(|_| ())
    }

    async fn open_interactive_dialog(
        &self,
        request: OpenDialogRequest,
    ) -> Result<(), PlatformError> {
        self.send(self.request(Method::POST, "/actions/dialogs/open").json(&request))
            .await
            .map(|_| ())
    }
}
