use std::sync::Arc;

use carlos_core::{HelpRequest, RequestId, RequestLedger};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{error, info};

use crate::model::{confirmation_post, request_post, ChatUser};
use crate::platform::{send_direct_message, BotIdentity, ChatPlatform, PlatformError};

pub const CREATE_FAILED_MESSAGE: &str = "Error creating the Rent-a-Carlos request post";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid callback base url `{url}`: {reason}")]
pub struct CallbackUrlError {
    pub url: String,
    pub reason: String,
}

/// Token-bearing callback URLs handed to the chat platform. Not `Debug`: every
/// URL carries the shared secret.
#[derive(Clone)]
pub struct CallbackUrls {
    complete: String,
    reject: String,
    dialog: String,
}

impl CallbackUrls {
    pub fn new(public_url: &str, token: &SecretString) -> Result<Self, CallbackUrlError> {
        let base = public_url.trim_end_matches('/');
        let build = |path: &str| -> Result<String, CallbackUrlError> {
            let raw = format!("{base}/api/{path}");
            let mut url = Url::parse(&raw).map_err(|error| CallbackUrlError {
                url: public_url.to_owned(),
                reason: error.to_string(),
            })?;
            url.query_pairs_mut().append_pair("token", token.expose_secret());
            Ok(url.into())
        };

        Ok(Self { complete: build("complete")?, reject: build("reject")?, dialog: build("dialog")? })
    }

    pub fn complete(&self) -> &str {
        &self.complete
    }

    pub fn reject(&self) -> &str {
        &self.reject
    }

    pub fn dialog(&self) -> &str {
        &self.dialog
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("invalid help request: {0}")]
    Invalid(#[from] carlos_core::DomainError),
    #[error("failed to deliver request to assignee {assignee_id}: {source}")]
    AssigneeDelivery { assignee_id: String, source: PlatformError },
    /// The assignee already has the request; only the confirmation was lost.
    #[error("request {request_id} was delivered but the confirmation to {reporter_id} failed: {source}")]
    ConfirmationDelivery { request_id: RequestId, reporter_id: String, source: PlatformError },
}

impl WorkflowError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "Missing user and/or description",
            Self::AssigneeDelivery { .. } | Self::ConfirmationDelivery { .. } => {
                CREATE_FAILED_MESSAGE
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedRequest {
    pub request_id: RequestId,
    pub reporter_post_id: String,
}

/// Turns a resolved reporter, assignee and description into an open help
/// request: an actionable direct message to the assignee plus a confirmation
/// to the reporter.
pub struct RequestWorkflow {
    platform: Arc<dyn ChatPlatform>,
    bot: BotIdentity,
    callbacks: CallbackUrls,
    ledger: Arc<RequestLedger>,
}

impl RequestWorkflow {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        bot: BotIdentity,
        callbacks: CallbackUrls,
        ledger: Arc<RequestLedger>,
    ) -> Self {
        Self { platform, bot, callbacks, ledger }
    }

    pub fn callbacks(&self) -> &CallbackUrls {
        &self.callbacks
    }

    pub fn platform(&self) -> &dyn ChatPlatform {
        self.platform.as_ref()
    }

    pub fn bot(&self) -> &BotIdentity {
        &self.bot
    }

    pub async fn create_request(
        &self,
        reporter: &ChatUser,
        assignee: &ChatUser,
        description: &str,
    ) -> Result<CreatedRequest, WorkflowError> {
        let request = HelpRequest::open(&reporter.id, &assignee.id, description.trim())?;
        info!(
            event_name = "request.create.received",
            reporter_user_id = %request.reporter_id,
            assignee_user_id = %request.assignee_id,
            self_assigned = request.is_self_assigned(),
            "creating help request"
        );

        let post = request_post(
            reporter,
            &request.description,
            self.callbacks.complete(),
            self.callbacks.reject(),
        );
        let created = send_direct_message(self.platform.as_ref(), &self.bot, &assignee.id, post)
            .await
            .map_err(|source| {
                error!(
                    event_name = "request.create.assignee_failed",
                    assignee_user_id = %assignee.id,
                    error = %source,
                    "could not deliver help request"
                );
                WorkflowError::AssigneeDelivery { assignee_id: assignee.id.clone(), source }
            })?;

        let request_id = RequestId(created.id);
        self.ledger.record_open(&request_id).await;

        let confirmation = confirmation_post(&request.description);
        let reporter_post =
            send_direct_message(self.platform.as_ref(), &self.bot, &reporter.id, confirmation)
                .await
                .map_err(|source| {
                    error!(
                        event_name = "request.create.confirmation_failed",
                        post_id = %request_id,
                        reporter_user_id = %reporter.id,
                        error = %source,
                        "help request delivered but confirmation failed"
                    );
                    WorkflowError::ConfirmationDelivery {
                        request_id: request_id.clone(),
                        reporter_id: reporter.id.clone(),
                        source,
                    }
                })?;

        info!(
            event_name = "request.create.completed",
            post_id = %request_id,
            reporter_user_id = %reporter.id,
            "help request opened"
        );
        Ok(CreatedRequest { request_id, reporter_post_id: reporter_post.id })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use carlos_core::{RequestAction, RequestLedger, RequestState};
    use secrecy::SecretString;

    use super::{CallbackUrls, RequestWorkflow, WorkflowError};
    use crate::memory::{direct_channel_id, InMemoryChatPlatform, PlatformOperation};
    use crate::model::{request_state, ChatUser};
    use crate::platform::BotIdentity;

    pub(crate) fn callbacks() -> CallbackUrls {
        CallbackUrls::new("https://carlos.test/", &SecretString::from("abc123".to_owned()))
            .expect("callbacks")
    }

    pub(crate) fn bot() -> BotIdentity {
        BotIdentity::new("BOT", "carlos")
    }

    pub(crate) fn user(id: &str, username: &str) -> ChatUser {
        ChatUser { id: id.to_owned(), username: username.to_owned() }
    }

    fn workflow(platform: &Arc<InMemoryChatPlatform>, ledger: &Arc<RequestLedger>) -> RequestWorkflow {
        RequestWorkflow::new(platform.clone(), bot(), callbacks(), ledger.clone())
    }

    #[test]
    fn callback_urls_carry_the_token_as_a_query_parameter() {
        let urls = callbacks();
        assert_eq!(urls.complete(), "https://carlos.test/api/complete?token=abc123");
        assert_eq!(urls.reject(), "https://carlos.test/api/reject?token=abc123");
        assert_eq!(urls.dialog(), "https://carlos.test/api/dialog?token=abc123");

        let escaped =
            CallbackUrls::new("http://host:8085", &SecretString::from("a b&c".to_owned()))
                .expect("callbacks");
        assert_eq!(escaped.complete(), "http://host:8085/api/complete?token=a+b%26c");
        assert!(CallbackUrls::new("not a url", &SecretString::from("t".to_owned())).is_err());
    }

    #[tokio::test]
    async fn creates_exactly_two_direct_messages() {
        let platform = Arc::new(InMemoryChatPlatform::new());
        let ledger = Arc::new(RequestLedger::new());

        let created = workflow(&platform, &ledger)
            .create_request(&user("R1", "rita"), &user("A1", "ana"), "  review my PR  ")
            .await
            .expect("created");

        let posts = platform.created_posts();
        assert_eq!(posts.len(), 2);

        let request = &posts[0];
        assert_eq!(request.id, created.request_id.0);
        assert_eq!(request.channel_id, direct_channel_id("BOT", "A1"));
        assert_eq!(request.user_id, "BOT");
        assert_eq!(request_state(request), Some(RequestState::Open));

        let actions = &request.attachments()[0].actions;
        assert_eq!(actions.len(), 2);
        let integrations: Vec<_> =
            actions.iter().filter_map(|action| action.integration.as_ref()).collect();
        assert_eq!(integrations[0].context.action, RequestAction::Complete);
        assert_eq!(integrations[0].url, "https://carlos.test/api/complete?token=abc123");
        assert_eq!(integrations[1].context.action, RequestAction::Reject);
        assert!(integrations.iter().all(|i| i.context.reporter_user_id == "R1"));

        let confirmation = &posts[1];
        assert_eq!(confirmation.id, created.reporter_post_id);
        assert_eq!(confirmation.channel_id, direct_channel_id("BOT", "R1"));
        assert_eq!(
            confirmation.message,
            "Your request was successfully submitted.\nRequest:\nreview my PR"
        );

        assert_eq!(ledger.state(&created.request_id).await, Some(RequestState::Open));
    }

    #[tokio::test]
    async fn assignee_failure_sends_nothing() {
        let platform = Arc::new(InMemoryChatPlatform::new());
        platform.fail(PlatformOperation::CreatePost);
        let ledger = Arc::new(RequestLedger::new());

        let error = workflow(&platform, &ledger)
            .create_request(&user("R1", "rita"), &user("A1", "ana"), "help")
            .await
            .expect_err("must fail");

        assert!(matches!(error, WorkflowError::AssigneeDelivery { .. }));
        assert_eq!(error.user_message(), "Error creating the Rent-a-Carlos request post");
        assert!(platform.created_posts().is_empty());
        assert_eq!(ledger.tracked(), 0);
    }

    #[tokio::test]
    async fn lost_confirmation_keeps_the_delivered_request_open() {
        let platform = Arc::new(InMemoryChatPlatform::new());
        platform.fail_direct_messages_to("R1");
        let ledger = Arc::new(RequestLedger::new());

        let error = workflow(&platform, &ledger)
            .create_request(&user("R1", "rita"), &user("A1", "ana"), "help")
            .await
            .expect_err("must fail");

        let WorkflowError::ConfirmationDelivery { request_id, reporter_id, .. } = &error else {
            panic!("expected a confirmation failure, got {error:?}");
        };
        assert_eq!(reporter_id, "R1");
        assert_eq!(error.user_message(), "Error creating the Rent-a-Carlos request post");

        let delivered = platform.direct_messages_to("A1");
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, request_id.0);
        assert_eq!(request_state(&delivered[0]), Some(RequestState::Open));
        assert!(platform.direct_messages_to("R1").is_empty());
        assert_eq!(ledger.state(request_id).await, Some(RequestState::Open));
    }

    #[tokio::test]
    async fn blank_description_is_rejected_before_any_call() {
        let platform = Arc::new(InMemoryChatPlatform::new());
        let ledger = Arc::new(RequestLedger::new());

        let error = workflow(&platform, &ledger)
            .create_request(&user("R1", "rita"), &user("A1", "ana"), "   ")
            .await
            .expect_err("must fail");

        assert!(matches!(error, WorkflowError::Invalid(_)));
        assert_eq!(platform.calls(), 0);
    }
}
