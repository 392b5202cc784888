use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Chat message id of the assignee-facing request post. It is the only handle
/// to a help request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Open,
    Completed,
    Rejected,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two terminal transitions an assignee can trigger from the request's
/// buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Complete,
    Reject,
}

impl RequestAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Reject => "reject",
        }
    }

    pub fn target_state(self) -> RequestState {
        match self {
            Self::Complete => RequestState::Completed,
            Self::Reject => RequestState::Rejected,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "complete" => Some(Self::Complete),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpRequest {
    pub reporter_id: String,
    pub assignee_id: String,
    pub description: String,
    pub state: RequestState,
}

impl HelpRequest {
    pub fn open(
        reporter_id: impl Into<String>,
        assignee_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let request = Self {
            reporter_id: reporter_id.into(),
            assignee_id: assignee_id.into(),
            description: description.into(),
            state: RequestState::Open,
        };

        if request.reporter_id.trim().is_empty() {
            return Err(DomainError::InvariantViolation("reporter id is required".to_owned()));
        }
        if request.assignee_id.trim().is_empty() {
            return Err(DomainError::InvariantViolation("assignee id is required".to_owned()));
        }
        if request.description.trim().is_empty() {
            return Err(DomainError::InvariantViolation("description is required".to_owned()));
        }

        Ok(request)
    }

    pub fn is_self_assigned(&self) -> bool {
        self.reporter_id == self.assignee_id
    }
}

#[cfg(test)]
mod tests {
    use super::{HelpRequest, RequestAction, RequestState};
    use crate::errors::DomainError;

    #[test]
    fn open_request_requires_all_parties_and_text() {
        let request = HelpRequest::open("R1", "A1", "fix the build").expect("valid request");
        assert_eq!(request.state, RequestState::Open);
        assert!(!request.is_self_assigned());

        assert!(matches!(
            HelpRequest::open("R1", "A1", "   "),
            Err(DomainError::InvariantViolation(message)) if message.contains("description")
        ));
        assert!(HelpRequest::open("", "A1", "text").is_err());
    }

    #[test]
    fn actions_parse_case_insensitively_and_map_to_terminal_states() {
        assert_eq!(RequestAction::parse(" Complete "), Some(RequestAction::Complete));
        assert_eq!(RequestAction::parse("reject"), Some(RequestAction::Reject));
        assert_eq!(RequestAction::parse("approve"), None);
        assert!(RequestAction::Complete.target_state().is_terminal());
        assert!(!RequestState::Open.is_terminal());
    }
}
