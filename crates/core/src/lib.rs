//! Request lifecycle core for the Rent-a-Carlos help desk bot.
//!
//! - **Configuration** (`config`) - layered file / env / override loading
//! - **Domain** (`domain`) - help requests, request actions and the button
//!   callback payload
//! - **Lifecycle** (`flows`) - Open -> Completed | Rejected transitions
//! - **Ledger** (`ledger`) - per-request serialization of transitions

pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod ledger;

pub use domain::action::{ActionContext, ActionPayload};
pub use domain::request::{HelpRequest, RequestAction, RequestId, RequestState};
pub use errors::{DomainError, PayloadError};
pub use flows::{RequestLifecycle, TransitionOutcome};
pub use ledger::{RequestLedger, RequestSlot};
