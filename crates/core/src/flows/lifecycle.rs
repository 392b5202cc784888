use serde::{Deserialize, Serialize};

use crate::domain::request::{RequestAction, RequestState};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestState,
    pub to: RequestState,
    pub action: RequestAction,
}

/// Help requests have a single live state and two terminal ones; each request
/// moves at most once.
#[derive(Clone, Debug, Default)]
pub struct RequestLifecycle;

impl RequestLifecycle {
    pub fn initial_state(&self) -> RequestState {
        RequestState::Open
    }

    pub fn apply(
        &self,
        current: RequestState,
        action: RequestAction,
    ) -> Result<TransitionOutcome, DomainError> {
        match current {
            RequestState::Open => {
                Ok(TransitionOutcome { from: current, to: action.target_state(), action })
            }
            RequestState::Completed | RequestState::Rejected => {
                Err(DomainError::InvalidTransition { from: current, action })
            }
        }
    }
}
