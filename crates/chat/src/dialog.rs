use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::model::{
    ephemeral_post, ChatUser, Dialog, DialogElement, DialogResponse, OpenDialogRequest,
};
use crate::platform::PlatformError;
use crate::workflow::{RequestWorkflow, WorkflowError};

pub const DIALOG_TITLE: &str = "Rent a Carlos - Request for help";
pub const DIALOG_SUBMIT_LABEL: &str = "Request help!";

/// Envelope the chat platform posts to the dialog callback URL.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SubmitDialogRequest {
    #[serde(default)]
    pub callback_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub submission: Map<String, Value>,
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogSubmission {
    pub message: String,
    /// `None` when the form was sent without an assignee.
    pub target: Option<String>,
}

impl DialogSubmission {
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, SubmissionError> {
        let message = match fields.get("message") {
            None | Some(Value::Null) => return Err(SubmissionError::MissingField("message")),
            Some(Value::String(message)) if message.trim().is_empty() => {
                return Err(SubmissionError::MissingField("message"))
            }
            Some(Value::String(message)) => message.trim().to_owned(),
            Some(_) => {
                return Err(SubmissionError::InvalidField { field: "message", expected: "a string" })
            }
        };

        let target = match fields.get("target") {
            None | Some(Value::Null) => None,
            Some(Value::String(target)) if target.trim().is_empty() => None,
            Some(Value::String(target)) => Some(target.trim().to_owned()),
            Some(_) => {
                return Err(SubmissionError::InvalidField { field: "target", expected: "a string" })
            }
        };

        Ok(Self { message, target })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("dialog submission is not valid JSON: {0}")]
    Malformed(String),
    #[error("dialog submission is missing `{0}`")]
    MissingField(&'static str),
    #[error("dialog submission field `{field}` must be {expected}")]
    InvalidField { field: &'static str, expected: &'static str },
    #[error("could not resolve submitting user {user_id}: {source}")]
    Reporter { user_id: String, source: PlatformError },
    #[error("could not resolve assignee {user_id}: {source}")]
    Assignee { user_id: String, source: PlatformError },
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl SubmissionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Malformed(_) | Self::InvalidField { .. } => "We could not read the request form",
            Self::MissingField(_) => "Missing user and/or description",
            Self::Reporter { .. } => "Error getting your details",
            Self::Assignee { .. } => "Did not found the requested user",
            Self::Workflow(error) => error.user_message(),
        }
    }
}

/// Opens the request form and turns its submission into a help request.
pub struct InteractiveDialogLauncher {
    workflow: Arc<RequestWorkflow>,
}

impl InteractiveDialogLauncher {
    pub fn new(workflow: Arc<RequestWorkflow>) -> Self {
        Self { workflow }
    }

    pub fn dialog_request(&self, trigger_id: &str) -> OpenDialogRequest {
        OpenDialogRequest {
            trigger_id: trigger_id.to_owned(),
            url: self.workflow.callbacks().dialog().to_owned(),
            dialog: Dialog {
                callback_id: Uuid::new_v4().simple().to_string(),
                title: DIALOG_TITLE.to_owned(),
                introduction_text: String::new(),
                elements: vec![
                    DialogElement {
                        display_name: "Request".to_owned(),
                        name: "message".to_owned(),
                        kind: "text".to_owned(),
                        subtype: "text".to_owned(),
                        data_source: String::new(),
                        help_text: "describe your request".to_owned(),
                        optional: false,
                    },
                    DialogElement {
                        display_name: "Assignee".to_owned(),
                        name: "target".to_owned(),
                        kind: "select".to_owned(),
                        subtype: String::new(),
                        data_source: "users".to_owned(),
                        help_text: "the @user that you need help".to_owned(),
                        optional: true,
                    },
                ],
                submit_label: DIALOG_SUBMIT_LABEL.to_owned(),
                notify_on_cancel: false,
                state: String::new(),
            },
        }
    }

    pub async fn launch(&self, trigger_id: &str, user: &ChatUser) -> Result<(), PlatformError> {
        let request = self.dialog_request(trigger_id);
        info!(
            event_name = "dialog.open.requested",
            user_id = %user.id,
            callback_id = %request.dialog.callback_id,
            "opening request dialog"
        );
        self.workflow.platform().open_interactive_dialog(request).await.map_err(|source| {
            error!(
                event_name = "dialog.open.failed",
                user_id = %user.id,
                error = %source,
                "failed opening interactive dialog"
            );
            source
        })
    }

    /// Handles a raw submission body. Errors are reported back to the dialog
    /// and, when the originating channel is known, as an ephemeral notice.
    pub async fn handle_submission(&self, body: &[u8]) -> DialogResponse {
        let request: SubmitDialogRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(source) => {
                let error = SubmissionError::Malformed(source.to_string());
                warn!(event_name = "dialog.submit.malformed", error = %error, "bad dialog body");
                return DialogResponse { error: Some(error.user_message().to_owned()) };
            }
        };

        info!(
            event_name = "dialog.submit.received",
            user_id = %request.user_id,
            callback_id = %request.callback_id,
            cancelled = request.cancelled,
            "received dialog submission"
        );
        if request.cancelled {
            return DialogResponse::default();
        }

        match self.submit(&request).await {
            Ok(()) => DialogResponse::default(),
            Err(error) => {
                warn!(
                    event_name = "dialog.submit.failed",
                    user_id = %request.user_id,
                    error = %error,
                    "dialog submission did not create a request"
                );
                let message = error.user_message();
                self.notify_submitter(&request, message).await;
                DialogResponse { error: Some(message.to_owned()) }
            }
        }
    }

    async fn submit(&self, request: &SubmitDialogRequest) -> Result<(), SubmissionError> {
        let submission = DialogSubmission::from_fields(&request.submission)?;
        let platform = self.workflow.platform();

        let reporter = platform.get_user(&request.user_id).await.map_err(|source| {
            SubmissionError::Reporter { user_id: request.user_id.clone(), source }
        })?;

        let assignee = match submission.target.as_deref() {
            None => reporter.clone(),
            Some(target) if target == reporter.id => reporter.clone(),
            Some(target) => platform.get_user(target).await.map_err(|source| {
                SubmissionError::Assignee { user_id: target.to_owned(), source }
            })?,
        };

        self.workflow.create_request(&reporter, &assignee, &submission.message).await?;
        Ok(())
    }

    async fn notify_submitter(&self, request: &SubmitDialogRequest, message: &str) {
        if request.user_id.is_empty() || request.channel_id.is_empty() {
            return;
        }

        let notice = ephemeral_post(&request.channel_id, &self.workflow.bot().user_id, message);
        if let Err(error) =
            self.workflow.platform().send_ephemeral_post(&request.user_id, notice).await
        {
            warn!(
                event_name = "dialog.submit.notice_failed",
                user_id = %request.user_id,
                error = %error,
                "could not send dialog error notice"
            );
        }
    }
}
