use thiserror::Error;

/// Errors raised while applying task state transitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateMachineError {
    /// The requested event is not a legal edge from the current state
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// The task is already terminal and immutable
    #[error("Task is in terminal state {state} and cannot transition")]
    TerminalState { state: String },

    /// A transition precondition was not met
    #[error("Guard failed: {reason}")]
    GuardFailed { reason: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
