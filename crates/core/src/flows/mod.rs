pub mod lifecycle;

pub use lifecycle::{RequestLifecycle, TransitionOutcome};
