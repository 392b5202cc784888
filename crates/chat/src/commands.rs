use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::dialog::InteractiveDialogLauncher;
use crate::model::CommandResponse;
use crate::workflow::RequestWorkflow;

pub const MISSING_ARGUMENTS_MESSAGE: &str = "Missing user and/or description";
pub const REPORTER_LOOKUP_MESSAGE: &str = "Error getting your details";
pub const ASSIGNEE_LOOKUP_MESSAGE: &str = "Did not found the requested user";
pub const DIALOG_FAILED_MESSAGE: &str = "We could not open the request dialog";

/// Slash-command form body as the chat platform posts it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlashCommand {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub trigger_id: String,
}

impl SlashCommand {
    pub fn line(&self) -> String {
        format!("{} {}", self.command, self.text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CarlosCommand {
    OpenDialog,
    Help,
    Request { username: String, description: String },
    MissingArguments,
    /// Addressed to some other command; answered with an empty response.
    Foreign,
}

pub fn parse_command(trigger: &str, line: &str) -> CarlosCommand {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some(command) if command.strip_prefix('/') == Some(trigger) => {}
        _ => return CarlosCommand::Foreign,
    }

    match tokens.next() {
        None => CarlosCommand::OpenDialog,
        Some("request") => {
            let parameters: Vec<&str> = tokens.collect();
            let [target, words @ ..] = parameters.as_slice() else {
                return CarlosCommand::MissingArguments;
            };
            if words.is_empty() {
                return CarlosCommand::MissingArguments;
            }
            CarlosCommand::Request {
                username: target.strip_prefix('@').unwrap_or(*target).to_owned(),
                description: words.join(" "),
            }
        }
        Some(_) => CarlosCommand::Help,
    }
}

pub fn help_text(trigger: &str) -> String {
    format!(
        "run:\n\t/{trigger} request <@User> <Description of what you need> - to request a help from a specified user\n\t/{trigger} help - to show the help\n"
    )
}

pub struct CommandDispatcher {
    trigger: String,
    workflow: Arc<RequestWorkflow>,
    launcher: Arc<InteractiveDialogLauncher>,
}

impl CommandDispatcher {
    pub fn new(
        trigger: impl Into<String>,
        workflow: Arc<RequestWorkflow>,
        launcher: Arc<InteractiveDialogLauncher>,
    ) -> Self {
        Self { trigger: trigger.into(), workflow, launcher }
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub async fn execute(&self, invocation: &SlashCommand) -> CommandResponse {
        let command = parse_command(&self.trigger, &invocation.line());
        info!(
            event_name = "command.received",
            user_id = %invocation.user_id,
            channel_id = %invocation.channel_id,
            command = command_kind(&command),
            "slash command received"
        );

        match command {
            CarlosCommand::Foreign => CommandResponse::empty(),
            CarlosCommand::Help => CommandResponse::ephemeral(help_text(&self.trigger)),
            CarlosCommand::MissingArguments => CommandResponse::ephemeral(MISSING_ARGUMENTS_MESSAGE),
            CarlosCommand::OpenDialog => self.open_dialog(invocation).await,
            CarlosCommand::Request { username, description } => {
                self.request(invocation, &username, &description).await
            }
        }
    }

    async fn open_dialog(&self, invocation: &SlashCommand) -> CommandResponse {
        let user = match self.workflow.platform().get_user(&invocation.user_id).await {
            Ok(user) => user,
            Err(error) => {
                warn!(
                    event_name = "command.reporter_lookup_failed",
                    user_id = %invocation.user_id,
                    error = %error,
                    "could not resolve invoking user"
                );
                return CommandResponse::ephemeral(REPORTER_LOOKUP_MESSAGE);
            }
        };

        match self.launcher.launch(&invocation.trigger_id, &user).await {
            Ok(()) => CommandResponse::empty(),
            Err(_) => CommandResponse::ephemeral(DIALOG_FAILED_MESSAGE),
        }
    }

    async fn request(
        &self,
        invocation: &SlashCommand,
        username: &str,
        description: &str,
    ) -> CommandResponse {
        let platform = self.workflow.platform();
        let reporter = match platform.get_user(&invocation.user_id).await {
            Ok(user) => user,
            Err(error) => {
                warn!(
                    event_name = "command.reporter_lookup_failed",
                    user_id = %invocation.user_id,
                    error = %error,
                    "could not resolve invoking user"
                );
                return CommandResponse::ephemeral(REPORTER_LOOKUP_MESSAGE);
            }
        };

        let assignee = match platform.get_user_by_username(username).await {
            Ok(user) => user,
            Err(error) => {
                warn!(
                    event_name = "command.assignee_lookup_failed",
                    user_id = %invocation.user_id,
                    username,
                    error = %error,
                    "requested user not found"
                );
                return CommandResponse::ephemeral(ASSIGNEE_LOOKUP_MESSAGE);
            }
        };

        match self.workflow.create_request(&reporter, &assignee, description).await {
            Ok(_) => CommandResponse::empty(),
            Err(error) => CommandResponse::ephemeral(error.user_message()),
        }
    }
}

fn command_kind(command: &CarlosCommand) -> &'static str {
    match command {
        CarlosCommand::OpenDialog => "dialog",
        CarlosCommand::Help => "help",
        CarlosCommand::Request { .. } => "request",
        CarlosCommand::MissingArguments => "request_incomplete",
        CarlosCommand::Foreign => "foreign",
    }
}
