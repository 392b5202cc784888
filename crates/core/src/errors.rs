use thiserror::Error;

use crate::domain::request::{RequestAction, RequestState};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("cannot {action} a request that is already {from}")]
    InvalidTransition { from: RequestState, action: RequestAction },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Decode failures for an inbound action-button callback. Each variant names
/// the offending field so the log line points at the broken client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("action payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("action payload is missing `{0}`")]
    MissingField(&'static str),
    #[error("action payload field `{field}` must be {expected}")]
    InvalidField { field: &'static str, expected: &'static str },
    #[error("action payload carries unknown action `{0}`")]
    UnknownAction(String),
    #[error("action payload has an empty reporter user id")]
    EmptyReporter,
}

impl PayloadError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyReporter
            | Self::MissingField("context.reporter_user_id")
            | Self::InvalidField { field: "context.reporter_user_id", .. } => {
                "Reporter UserID cannot be empty"
            }
            _ => "We could not decode the action",
        }
    }
}
