use carlos_core::{ActionContext, RequestAction, RequestState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ATTACHMENTS_PROP: &str = "attachments";
pub const REQUEST_TITLE: &str = "Request for help";
pub const COMPLETED_FIELD_TITLE: &str = "Task Completed";

/// Post props that survive the completion rewrite. Everything else the
/// original post carried is dropped.
const RETAINED_PROPS: [&str; 2] = ["override_username", "override_icon_url"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
}

impl Post {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    /// Attachments exactly as the platform stored them.
    pub fn attachment_values(&self) -> &[Value] {
        self.props.get(ATTACHMENTS_PROP).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_attachment_values(&mut self, attachments: Vec<Value>) {
        self.props.insert(ATTACHMENTS_PROP.to_owned(), Value::Array(attachments));
    }

    /// Typed view of the attachments; entries that do not decode are skipped.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.attachment_values()
            .iter()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    pub fn attachment_texts(&self) -> Vec<String> {
        self.attachment_values()
            .iter()
            .map(|attachment| {
                attachment.get("text").and_then(Value::as_str).unwrap_or_default().to_owned()
            })
            .collect()
    }

    pub fn has_actionable_attachment(&self) -> bool {
        self.attachment_values().iter().any(is_actionable)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PostAction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default)]
    pub short: bool,
}

impl AttachmentField {
    pub fn new(title: impl Into<String>, value: impl Into<String>, short: bool) -> Self {
        Self { title: title.into(), value: Value::String(value.into()), short }
    }

    pub fn title_only(title: impl Into<String>) -> Self {
        Self { title: title.into(), value: Value::Null, short: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAction {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<ActionIntegration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionIntegration {
    pub url: String,
    pub context: ActionContext,
}

impl PostAction {
    pub fn button(name: impl Into<String>, url: impl Into<String>, context: ActionContext) -> Self {
        Self {
            id: context.action.as_str().to_owned(),
            name: name.into(),
            kind: "button".to_owned(),
            integration: Some(ActionIntegration { url: url.into(), context }),
        }
    }
}

pub struct PostBuilder {
    message: String,
    attachments: Vec<Attachment>,
}

impl PostBuilder {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), attachments: Vec::new() }
    }

    pub fn attachment<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut AttachmentBuilder),
    {
        let mut builder = AttachmentBuilder::default();
        build(&mut builder);
        self.attachments.push(builder.build());
        self
    }

    pub fn build(self) -> Post {
        let mut post = Post::new(self.message);
        if !self.attachments.is_empty() {
            let values = self
                .attachments
                .into_iter()
                .map(|attachment| serde_json::to_value(attachment).unwrap_or(Value::Null))
                .collect();
            post.set_attachment_values(values);
        }
        post
    }
}

#[derive(Default)]
pub struct AttachmentBuilder {
    attachment: Attachment,
}

impl AttachmentBuilder {
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.attachment.title = title.into();
        self
    }

    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.attachment.text = text.into();
        self
    }

    pub fn field(&mut self, field: AttachmentField) -> &mut Self {
        self.attachment.fields.push(field);
        self
    }

    pub fn button(&mut self, action: PostAction) -> &mut Self {
        self.attachment.actions.push(action);
        self
    }

    fn build(self) -> Attachment {
        self.attachment
    }
}

pub fn is_actionable(attachment: &Value) -> bool {
    attachment.get("actions").and_then(Value::as_array).is_some_and(|actions| !actions.is_empty())
}

/// Reads a help request's state back out of its message. `None` means the
/// post does not look like a request at all.
pub fn request_state(post: &Post) -> Option<RequestState> {
    if post.has_actionable_attachment() {
        return Some(RequestState::Open);
    }

    let completed = post.attachments().iter().any(|attachment| {
        attachment.fields.iter().any(|field| field.title == COMPLETED_FIELD_TITLE)
    });
    completed.then_some(RequestState::Completed)
}

/// The assignee-facing request: one attachment carrying the reporter, the
/// description and the two transition buttons.
pub fn request_post(
    reporter: &ChatUser,
    description: &str,
    complete_url: &str,
    reject_url: &str,
) -> Post {
    PostBuilder::new("")
        .attachment(|attachment| {
            attachment
                .title(REQUEST_TITLE)
                .field(AttachmentField::new("Reporter", reporter.username.clone(), true))
                .text(description)
                .button(PostAction::button(
                    "Task Completed",
                    complete_url,
                    ActionContext::new(RequestAction::Complete, reporter.id.clone()),
                ))
                .button(PostAction::button(
                    "Reject Task",
                    reject_url,
                    ActionContext::new(RequestAction::Reject, reporter.id.clone()),
                ));
        })
        .build()
}

/// A bot-authored notice shown to one user inside `channel_id`.
pub fn ephemeral_post(channel_id: &str, bot_user_id: &str, text: &str) -> Post {
    let mut post = Post::new(text);
    post.channel_id = channel_id.to_owned();
    post.user_id = bot_user_id.to_owned();
    post.props.insert("from_webhook".to_owned(), Value::String("true".to_owned()));
    post
}

pub fn confirmation_post(description: &str) -> Post {
    Post::new(format!("Your request was successfully submitted.\nRequest:\n{description}"))
}

/// Notice sent to the reporter once a request reaches a terminal state.
pub fn outcome_notice(action: RequestAction, request: &Post) -> Post {
    let verb = match action {
        RequestAction::Complete => "completed",
        RequestAction::Reject => "rejected",
    };

    let mut lines = vec![format!("Your Request was {verb}.\nRequest:")];
    lines.extend(request.attachment_texts());
    Post::new(lines.join("\n"))
}

/// Rewrites an open request as completed. Attachments without actions are
/// carried over untouched; the action-bearing attachment loses its buttons and
/// gains a `Task Completed` field. Identity, channel and author are kept.
pub fn completed_post(original: &Post) -> Post {
    let attachments = original
        .attachment_values()
        .iter()
        .map(|attachment| match attachment {
            Value::Object(fields) if is_actionable(attachment) => {
                Value::Object(mark_attachment_completed(fields.clone()))
            }
            _ => attachment.clone(),
        })
        .collect();

    let mut updated = Post {
        id: original.id.clone(),
        channel_id: original.channel_id.clone(),
        user_id: original.user_id.clone(),
        ..Post::default()
    };
    updated.props.insert("from_webhook".to_owned(), Value::String("true".to_owned()));
    for prop in RETAINED_PROPS {
        if let Some(value) = original.props.get(prop) {
            updated.props.insert(prop.to_owned(), value.clone());
        }
    }
    updated.set_attachment_values(attachments);
    updated
}

fn mark_attachment_completed(mut attachment: Map<String, Value>) -> Map<String, Value> {
    attachment.remove("actions");

    let completed = serde_json::to_value(AttachmentField::title_only(COMPLETED_FIELD_TITLE))
        .unwrap_or(Value::Null);
    match attachment.get_mut("fields") {
        Some(Value::Array(fields)) => fields.push(completed),
        _ => {
            attachment.insert("fields".to_owned(), Value::Array(vec![completed]));
        }
    }
    attachment
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDialogRequest {
    pub trigger_id: String,
    pub url: String,
    pub dialog: Dialog,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub callback_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub introduction_text: String,
    pub elements: Vec<DialogElement>,
    pub submit_label: String,
    #[serde(default)]
    pub notify_on_cancel: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogElement {
    pub display_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subtype: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help_text: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandResponseType {
    Ephemeral,
    InChannel,
}

/// Reply to a slash command. An empty response renders nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<CommandResponseType>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl CommandResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self { response_type: Some(CommandResponseType::Ephemeral), text: text.into() }
    }
}

/// Reply to an action-button click; shown only to the user who clicked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralResponse {
    pub ephemeral_text: String,
}

impl EphemeralResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { ephemeral_text: text.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
