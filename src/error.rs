use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    TaskNotFound(String),
    StateTransitionError(String),
    StoreError(String),
    ValidationError(String),
    ConfigurationError(String),
    CommitError(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::TaskNotFound(msg) => write!(f, "Task not found: {msg}"),
            EngineError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            EngineError::StoreError(msg) => write!(f, "Store error: {msg}"),
            EngineError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            EngineError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            EngineError::CommitError(msg) => write!(f, "Commit error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::state_machine::StateMachineError> for EngineError {
    fn from(err: crate::state_machine::StateMachineError) -> Self {
        EngineError::StateTransitionError(err.to_string())
    }
}

impl From<crate::store::StoreError> for EngineError {
    fn from(err: crate::store::StoreError) -> Self {
        EngineError::StoreError(err.to_string())
    }
}

impl From<crate::config::ConfigurationError> for EngineError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        EngineError::ConfigurationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
