use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::request::{RequestAction, RequestId};
use crate::errors::PayloadError;

/// Context embedded in every request button and echoed back by the platform
/// when the button is clicked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub reporter_user_id: String,
    pub action: RequestAction,
}

impl ActionContext {
    pub fn new(action: RequestAction, reporter_user_id: impl Into<String>) -> Self {
        Self { reporter_user_id: reporter_user_id.into(), action }
    }
}

/// Body of an action-button callback: who clicked, on which post, and the
/// context that was attached to the button.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionPayload {
    pub user_id: String,
    pub post_id: RequestId,
    pub context: ActionContext,
}

impl ActionPayload {
    /// Decodes and validates a raw callback body. The platform sends many more
    /// keys (`channel_id`, `team_id`, `trigger_id`, ...); they are ignored.
    pub fn decode(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|error| PayloadError::Malformed(error.to_string()))?;
        let Value::Object(root) = value else {
            return Err(PayloadError::Malformed("expected a JSON object".to_owned()));
        };

        let context = match root.get("context") {
            None | Some(Value::Null) => return Err(PayloadError::MissingField("context")),
            Some(Value::Object(context)) => context,
            Some(_) => {
                return Err(PayloadError::InvalidField { field: "context", expected: "an object" })
            }
        };

        // Reporter is checked before anything else so an empty reporter never
        // reaches a lookup.
        let reporter_user_id =
            required_string(context, "reporter_user_id", "context.reporter_user_id")?;
        if reporter_user_id.trim().is_empty() {
            return Err(PayloadError::EmptyReporter);
        }

        let raw_action = required_string(context, "action", "context.action")?;
        let action = RequestAction::parse(&raw_action)
            .ok_or_else(|| PayloadError::UnknownAction(raw_action.clone()))?;

        let user_id = required_string(&root, "user_id", "user_id")?;
        if user_id.trim().is_empty() {
            return Err(PayloadError::MissingField("user_id"));
        }

        let post_id = required_string(&root, "post_id", "post_id")?;
        if post_id.trim().is_empty() {
            return Err(PayloadError::MissingField("post_id"));
        }

        Ok(Self {
            user_id,
            post_id: RequestId(post_id),
            context: ActionContext { reporter_user_id, action },
        })
    }
}

fn required_string(
    object: &Map<String, Value>,
    key: &str,
    field: &'static str,
) -> Result<String, PayloadError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(PayloadError::MissingField(field)),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(PayloadError::InvalidField { field, expected: "a string" }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionContext, ActionPayload};
    use crate::domain::request::{RequestAction, RequestId};
    use crate::errors::PayloadError;

    #[test]
    fn decodes_platform_callback_and_ignores_extra_keys() {
        let body = br#"{
            "user_id": "U1",
            "post_id": "P1",
            "channel_id": "C1",
            "team_id": "T1",
            "context": {"reporter_user_id": "R1", "action": "complete"}
        }"#;

        let payload = ActionPayload::decode(body).expect("decode");
        assert_eq!(payload.user_id, "U1");
        assert_eq!(payload.post_id, RequestId("P1".to_owned()));
        assert_eq!(payload.context, ActionContext::new(RequestAction::Complete, "R1"));
    }

    #[test]
    fn empty_reporter_is_rejected_before_other_fields() {
        let body = br#"{"context": {"reporter_user_id": "", "action": "reject"}}"#;
        assert_eq!(ActionPayload::decode(body), Err(PayloadError::EmptyReporter));
    }

    #[test]
    fn names_the_missing_or_mistyped_field() {
        assert_eq!(
            ActionPayload::decode(br#"{"user_id": "U1", "post_id": "P1"}"#),
            Err(PayloadError::MissingField("context"))
        );
        assert_eq!(
            ActionPayload::decode(br#"{"user_id": "U1", "post_id": "P1", "context": {"action": "complete"}}"#),
            Err(PayloadError::MissingField("context.reporter_user_id"))
        );
        assert_eq!(
            ActionPayload::decode(
                br#"{"user_id": "U1", "post_id": 7, "context": {"reporter_user_id": "R1", "action": "complete"}}"#
            ),
            Err(PayloadError::InvalidField { field: "post_id", expected: "a string" })
        );
        assert_eq!(
            ActionPayload::decode(
                br#"{"user_id": "U1", "post_id": "P1", "context": {"reporter_user_id": "R1", "action": "snooze"}}"#
            ),
            Err(PayloadError::UnknownAction("snooze".to_owned()))
        );
    }

    #[test]
    fn garbage_body_is_malformed() {
        assert!(matches!(ActionPayload::decode(b"not json"), Err(PayloadError::Malformed(_))));
        assert!(matches!(ActionPayload::decode(b"null"), Err(PayloadError::Malformed(_))));
    }
}
