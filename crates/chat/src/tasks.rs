use std::sync::Arc;

use carlos_core::{
    ActionPayload, RequestAction, RequestLedger, RequestLifecycle, RequestSlot, RequestState,
    TransitionOutcome,
};
use tracing::{error, info, warn};

use crate::model::{completed_post, outcome_notice, request_state, EphemeralResponse, Post};
use crate::platform::{send_direct_message, BotIdentity, ChatPlatform};

pub const TASK_COMPLETED_MESSAGE: &str = "Task completed.";
pub const TASK_DELETED_MESSAGE: &str = "Task deleted.";
pub const ALREADY_RESOLVED_MESSAGE: &str = "This request was already resolved.";
pub const COMPLETE_FETCH_FAILED_MESSAGE: &str = "We could not find the request to complete.";
pub const UPDATE_FAILED_MESSAGE: &str = "Error updating the Rent-a-Carlos request post";
pub const DELETE_FAILED_MESSAGE: &str = "Error deleting the Rent-a-Carlos request post";

/// Applies the assignee's button clicks to an open request.
///
/// Every transition holds the request's ledger slot from the first read to the
/// last write, so of two racing clicks only the first one mutates anything.
pub struct TaskStateHandler {
    platform: Arc<dyn ChatPlatform>,
    bot: BotIdentity,
    ledger: Arc<RequestLedger>,
    lifecycle: RequestLifecycle,
}

impl TaskStateHandler {
    pub fn new(platform: Arc<dyn ChatPlatform>, bot: BotIdentity, ledger: Arc<RequestLedger>) -> Self {
        Self { platform, bot, ledger, lifecycle: RequestLifecycle }
    }

    /// Decodes a raw callback body and applies `action`. The path decides the
    /// action; a disagreeing button context is only logged.
    pub async fn handle(&self, action: RequestAction, body: &[u8]) -> EphemeralResponse {
        let payload = match ActionPayload::decode(body) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    event_name = "request.action.rejected",
                    action = %action,
                    error = %error,
                    "could not decode action payload"
                );
                return EphemeralResponse::new(error.user_message());
            }
        };

        if payload.context.action != action {
            warn!(
                event_name = "request.action.context_mismatch",
                post_id = %payload.post_id,
                path_action = %action,
                context_action = %payload.context.action,
                "button context disagrees with callback path"
            );
        }

        match action {
            RequestAction::Complete => self.complete(&payload).await,
            RequestAction::Reject => self.reject(&payload).await,
        }
    }

    pub async fn complete(&self, payload: &ActionPayload) -> EphemeralResponse {
        info!(
            event_name = "request.complete.received",
            post_id = %payload.post_id,
            user_id = %payload.user_id,
            reporter_user_id = %payload.context.reporter_user_id,
            "complete requested"
        );

        let mut slot = self.ledger.lock(&payload.post_id).await;
        if let Some(rejection) = self.refuse_if_resolved(&slot, RequestAction::Complete) {
            return rejection;
        }

        let post = match self.platform.get_post(&payload.post_id.0).await {
            Ok(post) => post,
            Err(source) => {
                error!(
                    event_name = "request.complete.fetch_failed",
                    post_id = %payload.post_id,
                    error = %source,
                    "could not fetch request to complete"
                );
                return EphemeralResponse::new(COMPLETE_FETCH_FAILED_MESSAGE);
            }
        };

        let transition = match self.transition(&slot, Some(&post), RequestAction::Complete) {
            Ok(transition) => transition,
            Err(rejection) => return rejection,
        };

        if let Err(source) = self.platform.update_post(completed_post(&post)).await {
            error!(
                event_name = "request.complete.update_failed",
                post_id = %payload.post_id,
                error = %source,
                "could not rewrite request as completed"
            );
            return EphemeralResponse::new(UPDATE_FAILED_MESSAGE);
        }
        slot.record(transition.to);

        info!(
            event_name = "request.complete.applied",
            post_id = %payload.post_id,
            from = %transition.from,
            to = %transition.to,
            "request completed"
        );
        self.notify_reporter(payload, RequestAction::Complete, &post).await;
        EphemeralResponse::new(TASK_COMPLETED_MESSAGE)
    }

    pub async fn reject(&self, payload: &ActionPayload) -> EphemeralResponse {
        info!(
            event_name = "request.reject.received",
            post_id = %payload.post_id,
            user_id = %payload.user_id,
            reporter_user_id = %payload.context.reporter_user_id,
            "reject requested"
        );

        let mut slot = self.ledger.lock(&payload.post_id).await;
        if let Some(rejection) = self.refuse_if_resolved(&slot, RequestAction::Reject) {
            return rejection;
        }

        let post = match self.platform.get_post(&payload.post_id.0).await {
            Ok(post) => post,
            Err(source) => {
                // Unreadable requests are still cleared out of the assignee's inbox.
                warn!(
                    event_name = "request.reject.fetch_failed",
                    post_id = %payload.post_id,
                    error = %source,
                    "could not fetch request to reject, deleting anyway"
                );
                match self.platform.delete_post(&payload.post_id.0).await {
                    Ok(()) => slot.record(RequestState::Rejected),
                    Err(source) if source.is_not_found() => slot.record(RequestState::Rejected),
                    // The message may still carry its buttons, so it stays open for a retry.
                    Err(source) => warn!(
                        event_name = "request.reject.cleanup_failed",
                        post_id = %payload.post_id,
                        error = %source,
                        "best-effort delete failed"
                    ),
                }
                return EphemeralResponse::new(TASK_DELETED_MESSAGE);
            }
        };

        let transition = match self.transition(&slot, Some(&post), RequestAction::Reject) {
            Ok(transition) => transition,
            Err(rejection) => return rejection,
        };

        if let Err(source) = self.platform.delete_post(&payload.post_id.0).await {
            error!(
                event_name = "request.reject.delete_failed",
                post_id = %payload.post_id,
                error = %source,
                "could not delete rejected request"
            );
            return EphemeralResponse::new(DELETE_FAILED_MESSAGE);
        }
        slot.record(transition.to);

        info!(
            event_name = "request.reject.applied",
            post_id = %payload.post_id,
            from = %transition.from,
            to = %transition.to,
            "request rejected"
        );
        self.notify_reporter(payload, RequestAction::Reject, &post).await;
        EphemeralResponse::new(TASK_DELETED_MESSAGE)
    }

    /// Current state of the request: the ledger when it knows, otherwise the
    /// shape of the fetched message. A message without buttons can no longer
    /// be transitioned.
    fn observed_state(slot: &RequestSlot, post: Option<&Post>) -> Option<RequestState> {
        slot.state().or_else(|| {
            post.map(|post| request_state(post).unwrap_or(RequestState::Completed))
        })
    }

    fn transition(
        &self,
        slot: &RequestSlot,
        post: Option<&Post>,
        action: RequestAction,
    ) -> Result<TransitionOutcome, EphemeralResponse> {
        let state = Self::observed_state(slot, post).unwrap_or(RequestState::Open);
        self.lifecycle.apply(state, action).map_err(|error| {
            info!(
                event_name = "request.action.already_resolved",
                post_id = %slot.id(),
                action = %action,
                error = %error,
                "ignoring transition on a resolved request"
            );
            EphemeralResponse::new(ALREADY_RESOLVED_MESSAGE)
        })
    }

    /// Refuses early when the ledger already knows the request is resolved.
    fn refuse_if_resolved(
        &self,
        slot: &RequestSlot,
        action: RequestAction,
    ) -> Option<EphemeralResponse> {
        slot.state()?;
        self.transition(slot, None, action).err()
    }

    async fn notify_reporter(&self, payload: &ActionPayload, action: RequestAction, post: &Post) {
        let reporter = &payload.context.reporter_user_id;
        let notice = outcome_notice(action, post);
        if let Err(source) =
            send_direct_message(self.platform.as_ref(), &self.bot, reporter, notice).await
        {
            error!(
                event_name = "request.notify.failed",
                post_id = %payload.post_id,
                reporter_user_id = %reporter,
                action = %action,
                error = %source,
                "could not notify reporter"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use carlos_core::{RequestAction, RequestId, RequestLedger, RequestState};
    use serde_json::json;

    use super::{
        TaskStateHandler, ALREADY_RESOLVED_MESSAGE, COMPLETE_FETCH_FAILED_MESSAGE,
        DELETE_FAILED_MESSAGE, TASK_COMPLETED_MESSAGE, TASK_DELETED_MESSAGE,
        UPDATE_FAILED_MESSAGE,
    };
    use crate::memory::{direct_channel_id, InMemoryChatPlatform, PlatformOperation};
    use crate::model::{completed_post, request_post, request_state, Post, COMPLETED_FIELD_TITLE};
    use crate::workflow::tests::{bot, user};

    struct Fixture {
        platform: Arc<InMemoryChatPlatform>,
        ledger: Arc<RequestLedger>,
        handler: TaskStateHandler,
    }

    fn fixture() -> Fixture {
        let platform = Arc::new(InMemoryChatPlatform::new());
        let ledger = Arc::new(RequestLedger::new());
        let handler = TaskStateHandler::new(platform.clone(), bot(), ledger.clone());
        Fixture { platform, ledger, handler }
    }

    fn seed_request(platform: &InMemoryChatPlatform, id: &str) -> Post {
        let mut post = request_post(
            &user("R1", "rita"),
            "fix the flaky deploy",
            "https://carlos.test/api/complete?token=abc123",
            "https://carlos.test/api/reject?token=abc123",
        );
        post.id = id.to_owned();
        post.channel_id = direct_channel_id("BOT", "A1");
        post.user_id = "BOT".to_owned();
        platform.insert_post(post)
    }

    fn body(action: &str, post_id: &str) -> Vec<u8> {
        json!({
            "user_id": "A1",
            "post_id": post_id,
            "channel_id": "D1",
            "context": {"reporter_user_id": "R1", "action": action}
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn complete_rewrites_the_request_and_notifies_the_reporter() {
        let fx = fixture();
        let original = seed_request(&fx.platform, "P1");

        let response = fx.handler.handle(RequestAction::Complete, &body("complete", "P1")).await;
        assert_eq!(response.ephemeral_text, TASK_COMPLETED_MESSAGE);

        let stored = fx.platform.post("P1").expect("still present");
        assert_eq!(stored, completed_post(&original));
        assert_eq!(request_state(&stored), Some(RequestState::Completed));
        let fields = &stored.attachments()[0].fields;
        assert_eq!(fields.iter().filter(|f| f.title == COMPLETED_FIELD_TITLE).count(), 1);

        let notices = fx.platform.direct_messages_to("R1");
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, "Your Request was completed.\nRequest:\nfix the flaky deploy");
        assert_eq!(fx.ledger.tracked(), 0);
    }

    #[tokio::test]
    async fn reject_deletes_the_request_and_notifies_once() {
        let fx = fixture();
        seed_request(&fx.platform, "P1");

        let response = fx.handler.handle(RequestAction::Reject, &body("reject", "P1")).await;
        assert_eq!(response.ephemeral_text, TASK_DELETED_MESSAGE);
        assert!(fx.platform.post("P1").is_none());

        let notices = fx.platform.direct_messages_to("R1");
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, "Your Request was rejected.\nRequest:\nfix the flaky deploy");
    }

    #[tokio::test]
    async fn reject_on_a_missing_request_still_attempts_deletion() {
        let fx = fixture();

        let response = fx.handler.handle(RequestAction::Reject, &body("reject", "GONE")).await;
        assert_eq!(response.ephemeral_text, TASK_DELETED_MESSAGE);
        assert_eq!(fx.platform.delete_attempts(), vec!["GONE".to_owned()]);
        assert!(fx.platform.direct_messages_to("R1").is_empty());
    }

    #[tokio::test]
    async fn empty_reporter_is_refused_before_any_platform_call() {
        let fx = fixture();
        seed_request(&fx.platform, "P1");
        let body = json!({
            "user_id": "A1",
            "post_id": "P1",
            "context": {"reporter_user_id": "", "action": "complete"}
        })
        .to_string();

        let response = fx.handler.handle(RequestAction::Complete, body.as_bytes()).await;
        assert_eq!(response.ephemeral_text, "Reporter UserID cannot be empty");

        let garbage = fx.handler.handle(RequestAction::Reject, b"[]").await;
        assert_eq!(garbage.ephemeral_text, "We could not decode the action");
        assert_eq!(fx.platform.calls(), 0);
    }

    #[tokio::test]
    async fn first_transition_wins() {
        let fx = fixture();
        seed_request(&fx.platform, "P1");
        fx.ledger.record_open(&RequestId("P1".to_owned())).await;

        let first = fx.handler.handle(RequestAction::Complete, &body("complete", "P1")).await;
        assert_eq!(first.ephemeral_text, TASK_COMPLETED_MESSAGE);

        let second = fx.handler.handle(RequestAction::Reject, &body("reject", "P1")).await;
        assert_eq!(second.ephemeral_text, ALREADY_RESOLVED_MESSAGE);
        let again = fx.handler.handle(RequestAction::Complete, &body("complete", "P1")).await;
        assert_eq!(again.ephemeral_text, ALREADY_RESOLVED_MESSAGE);

        assert_eq!(fx.platform.updated_posts().len(), 1);
        assert!(fx.platform.delete_attempts().is_empty());
        assert!(fx.platform.post("P1").is_some());
        assert_eq!(fx.platform.direct_messages_to("R1").len(), 1);
    }

    #[tokio::test]
    async fn concurrent_clicks_resolve_the_request_once() {
        let fx = fixture();
        seed_request(&fx.platform, "P1");
        let handler = Arc::new(fx.handler);

        let complete = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler.handle(RequestAction::Complete, &body("complete", "P1")).await
            })
        };
        let reject = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler.handle(RequestAction::Reject, &body("reject", "P1")).await
            })
        };

        let texts = vec![
            complete.await.expect("join").ephemeral_text,
            reject.await.expect("join").ephemeral_text,
        ];
        let applied = texts
            .iter()
            .filter(|text| *text == TASK_COMPLETED_MESSAGE || *text == TASK_DELETED_MESSAGE)
            .count();
        assert_eq!(applied, 1, "{texts:?}");
        assert_eq!(fx.platform.direct_messages_to("R1").len(), 1);
    }

    #[tokio::test]
    async fn unknown_request_without_buttons_counts_as_resolved() {
        let fx = fixture();
        let original = seed_request(&fx.platform, "P1");
        fx.platform.insert_post(completed_post(&original));

        let response = fx.handler.handle(RequestAction::Reject, &body("reject", "P1")).await;
        assert_eq!(response.ephemeral_text, ALREADY_RESOLVED_MESSAGE);
        assert!(fx.platform.post("P1").is_some());
        assert!(fx.platform.delete_attempts().is_empty());
    }

    #[tokio::test]
    async fn complete_failures_leave_the_request_open() {
        let fx = fixture();
        let original = seed_request(&fx.platform, "P1");

        let missing = fx.handler.handle(RequestAction::Complete, &body("complete", "NOPE")).await;
        assert_eq!(missing.ephemeral_text, COMPLETE_FETCH_FAILED_MESSAGE);

        fx.platform.fail(PlatformOperation::UpdatePost);
        let failed = fx.handler.handle(RequestAction::Complete, &body("complete", "P1")).await;
        assert_eq!(failed.ephemeral_text, UPDATE_FAILED_MESSAGE);
        assert_eq!(fx.platform.post("P1"), Some(original));
        assert_eq!(fx.ledger.state(&RequestId("P1".to_owned())).await, None);
        assert!(fx.platform.direct_messages_to("R1").is_empty());

        fx.platform.recover(PlatformOperation::UpdatePost);
        let retried = fx.handler.handle(RequestAction::Complete, &body("complete", "P1")).await;
        assert_eq!(retried.ephemeral_text, TASK_COMPLETED_MESSAGE);
    }

    #[tokio::test]
    async fn delete_failure_is_reported_and_notification_failure_is_not() {
        let fx = fixture();
        seed_request(&fx.platform, "P1");

        fx.platform.fail(PlatformOperation::DeletePost);
        let failed = fx.handler.handle(RequestAction::Reject, &body("reject", "P1")).await;
        assert_eq!(failed.ephemeral_text, DELETE_FAILED_MESSAGE);
        assert!(fx.platform.post("P1").is_some());

        fx.platform.recover(PlatformOperation::DeletePost);
        fx.platform.fail(PlatformOperation::CreatePost);
        let deleted = fx.handler.handle(RequestAction::Reject, &body("reject", "P1")).await;
        assert_eq!(deleted.ephemeral_text, TASK_DELETED_MESSAGE);
        assert!(fx.platform.post("P1").is_none());
    }

    #[tokio::test]
    async fn reject_during_an_outage_can_be_retried() {
        let fx = fixture();
        seed_request(&fx.platform, "P1");
        fx.ledger.record_open(&RequestId("P1".to_owned())).await;

        fx.platform.fail(PlatformOperation::GetPost);
        fx.platform.fail(PlatformOperation::DeletePost);
        let during = fx.handler.handle(RequestAction::Reject, &body("reject", "P1")).await;
        assert_eq!(during.ephemeral_text, TASK_DELETED_MESSAGE);
        assert!(fx.platform.post("P1").is_some_and(|post| post.has_actionable_attachment()));
        assert_eq!(
            fx.ledger.state(&RequestId("P1".to_owned())).await,
            Some(RequestState::Open)
        );

        fx.platform.recover(PlatformOperation::GetPost);
        fx.platform.recover(PlatformOperation::DeletePost);
        let retried = fx.handler.handle(RequestAction::Reject, &body("reject", "P1")).await;
        assert_eq!(retried.ephemeral_text, TASK_DELETED_MESSAGE);
        assert!(fx.platform.post("P1").is_none());
        assert_eq!(fx.platform.direct_messages_to("R1").len(), 1);
    }

    #[tokio::test]
    async fn complete_survives_a_failed_reporter_notice() {
        let fx = fixture();
        let original = seed_request(&fx.platform, "P1");
        fx.platform.fail_direct_messages_to("R1");

        let response = fx.handler.handle(RequestAction::Complete, &body("complete", "P1")).await;
        assert_eq!(response.ephemeral_text, TASK_COMPLETED_MESSAGE);
        assert_eq!(fx.platform.post("P1"), Some(completed_post(&original)));
        assert!(fx.platform.direct_messages_to("R1").is_empty());
    }

    #[tokio::test]
    async fn callback_path_decides_the_action() {
        let fx = fixture();
        seed_request(&fx.platform, "P1");

        let response = fx.handler.handle(RequestAction::Reject, &body("complete", "P1")).await;
        assert_eq!(response.ephemeral_text, TASK_DELETED_MESSAGE);
        assert!(fx.platform.post("P1").is_none());
    }
}
